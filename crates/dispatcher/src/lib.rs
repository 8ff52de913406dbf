//! # Dispatcher
//!
//! 后台分发模块。
//!
//! 负责：
//! - 持久化报文，解析目标，fan-out 到所有目标
//! - 失败时补偿（发送 failure 报文类型）并标记交易失败
//! - 有界队列 + 固定 worker 池，优雅停机时排空队列

pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod pool;

pub use coordinator::{
    DispatchCoordinator, DispatchOutcome, DispatchPolicy, DispatchReport, DispatchState,
};
pub use error::{DispatchError, DispatchStage, FinalizerAction, SubmitError};
pub use fanout::post_to_targets;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use pool::{DispatchJob, DispatchPool, DispatchQueue};
