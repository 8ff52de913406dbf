//! # Gateway
//!
//! HTTP 接入层（axum）。
//!
//! 负责：
//! - 同步校验请求（body、交易头、报文、交易存在性）
//! - 校验通过后投递到 `DispatchQueue`，立即返回 `201`
//! - 健康检查

pub mod error;
pub mod handlers;
pub mod response;

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use contracts::TransactionLookup;

pub use error::GatewayError;
pub use handlers::{health, post_message, AppState};
pub use response::{ApiResponse, Rejection, ResponseStatus};

/// Health route under the base path
pub const HEALTH_SUFFIX: &str = "/_healthy";

/// Build the router for `base_path` (e.g. `/msa/out`)
pub fn router<L>(state: AppState<L>, base_path: &str) -> Router
where
    L: TransactionLookup + Send + Sync + 'static,
{
    Router::new()
        .route(base_path, post(post_message::<L>))
        .route(&format!("{base_path}{HEALTH_SUFFIX}"), get(health))
        .with_state(state)
}

pub async fn bind(addr: &str) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::bind(addr, e))
}

/// Serve until `shutdown` resolves, then finish in-flight requests
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
