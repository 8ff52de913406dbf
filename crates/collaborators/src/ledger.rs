//! Transaction ledger adapters
//!
//! - `RemoteLedger`: ledger service over HTTP
//! - `LogOnlyLedger`: accepts every transaction and only logs outcomes
//! - `MemoryLedger`: records calls in memory for assertions
//! - `Ledger`: remote or log-only, from `LedgerConfig`

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use contracts::{
    ContractError, LedgerConfig, RequestContext, Settlement, StorageReference,
    TransactionFinalizer, TransactionLookup, REQUEST_ID_HEADER,
};

/// Ledger service client
///
/// - `GET  <url>/transactions/{id}` (404 = unknown)
/// - `POST <url>/transactions/{id}/release`
/// - `POST <url>/transactions/{id}/fail`
#[derive(Debug, Clone)]
pub struct RemoteLedger {
    client: reqwest::Client,
    base: Url,
}

impl RemoteLedger {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ContractError> {
        let base = Url::parse(url)
            .map_err(|e| ContractError::ledger("-", format!("invalid ledger url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContractError::ledger("-", format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    fn transaction_url(&self, transaction_id: &str, action: Option<&str>) -> Result<Url, ContractError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ContractError::ledger(transaction_id, "ledger url cannot be a base")
            })?;
            segments.pop_if_empty().push("transactions").push(transaction_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    async fn post_action(
        &self,
        context: &RequestContext,
        action: &str,
        body: serde_json::Value,
    ) -> Result<(), ContractError> {
        let transaction_id = context.transaction_id.as_str();
        let response = self
            .client
            .post(self.transaction_url(transaction_id, Some(action))?)
            .header(REQUEST_ID_HEADER, context.request_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| ContractError::ledger(transaction_id, format!("{action} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractError::ledger(
                transaction_id,
                format!("{action} answered {status}"),
            ));
        }
        Ok(())
    }
}

impl TransactionLookup for RemoteLedger {
    #[instrument(name = "remote_ledger_exists", skip(self))]
    async fn exists(&self, transaction_id: &str) -> Result<bool, ContractError> {
        let response = self
            .client
            .get(self.transaction_url(transaction_id, None)?)
            .send()
            .await
            .map_err(|e| ContractError::ledger(transaction_id, format!("lookup failed: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ContractError::ledger(
                transaction_id,
                format!("lookup answered {status}"),
            )),
        }
    }
}

impl TransactionFinalizer for RemoteLedger {
    #[instrument(
        name = "remote_ledger_release",
        skip(self, context, settlement),
        fields(transaction_id = %context.transaction_id)
    )]
    async fn release(
        &self,
        context: &RequestContext,
        settlement: &Settlement,
    ) -> Result<(), ContractError> {
        let body = serde_json::to_value(settlement)
            .map_err(|e| ContractError::ledger(&context.transaction_id, e.to_string()))?;
        self.post_action(context, "release", body).await?;
        debug!("Transaction released");
        Ok(())
    }

    #[instrument(
        name = "remote_ledger_fail",
        skip(self, context, storage_reference),
        fields(transaction_id = %context.transaction_id)
    )]
    async fn fail(
        &self,
        context: &RequestContext,
        storage_reference: Option<&StorageReference>,
    ) -> Result<(), ContractError> {
        let body = json!({ "storage_reference": storage_reference });
        self.post_action(context, "fail", body).await?;
        debug!("Transaction failed");
        Ok(())
    }
}

/// Finalization recorded by [`MemoryLedger`]
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    Release {
        transaction_id: String,
        settlement: Settlement,
    },
    Fail {
        transaction_id: String,
        storage_reference: Option<StorageReference>,
    },
}

impl LedgerCall {
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Release { transaction_id, .. } | Self::Fail { transaction_id, .. } => {
                transaction_id
            }
        }
    }
}

/// In-memory ledger
///
/// Without a known-transaction set every id exists.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    known: Option<HashSet<String>>,
    calls: Mutex<Vec<LedgerCall>>,
    fail_release: AtomicBool,
    fail_fail: AtomicBool,
    fail_lookup: AtomicBool,
}

impl MemoryLedger {
    /// Ledger accepting every transaction id
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Ledger knowing only `transaction_ids`
    pub fn with_transactions<I, S>(transaction_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(transaction_ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_fail(&self, fail: bool) {
        self.fail_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls recorded for one transaction
    pub fn calls_for(&self, transaction_id: &str) -> Vec<LedgerCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.transaction_id() == transaction_id)
            .collect()
    }

    /// Poll until at least `count` calls are recorded, up to `timeout`
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.calls.lock().unwrap().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, call: LedgerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TransactionLookup for MemoryLedger {
    async fn exists(&self, transaction_id: &str) -> Result<bool, ContractError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(ContractError::ledger(transaction_id, "mock failure"));
        }
        Ok(self
            .known
            .as_ref()
            .is_none_or(|known| known.contains(transaction_id)))
    }
}

impl TransactionFinalizer for MemoryLedger {
    async fn release(
        &self,
        context: &RequestContext,
        settlement: &Settlement,
    ) -> Result<(), ContractError> {
        self.record(LedgerCall::Release {
            transaction_id: context.transaction_id.clone(),
            settlement: settlement.clone(),
        });
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(ContractError::ledger(&context.transaction_id, "mock failure"));
        }
        Ok(())
    }

    async fn fail(
        &self,
        context: &RequestContext,
        storage_reference: Option<&StorageReference>,
    ) -> Result<(), ContractError> {
        self.record(LedgerCall::Fail {
            transaction_id: context.transaction_id.clone(),
            storage_reference: storage_reference.cloned(),
        });
        if self.fail_fail.load(Ordering::SeqCst) {
            return Err(ContractError::ledger(&context.transaction_id, "mock failure"));
        }
        Ok(())
    }
}

/// Stand-in for a missing ledger service.
///
/// Every transaction exists and outcomes go to the log. Nothing is kept,
/// so it is safe for a long-running service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyLedger;

impl TransactionLookup for LogOnlyLedger {
    async fn exists(&self, _transaction_id: &str) -> Result<bool, ContractError> {
        Ok(true)
    }
}

impl TransactionFinalizer for LogOnlyLedger {
    async fn release(
        &self,
        context: &RequestContext,
        settlement: &Settlement,
    ) -> Result<(), ContractError> {
        info!(
            transaction_id = %context.transaction_id,
            storage_reference = %settlement.storage_reference,
            message_version = %settlement.message_version,
            response_code = %settlement.response_code,
            currency = %settlement.currency,
            amount = %settlement.amount,
            "Transaction released"
        );
        Ok(())
    }

    async fn fail(
        &self,
        context: &RequestContext,
        storage_reference: Option<&StorageReference>,
    ) -> Result<(), ContractError> {
        let storage_reference = storage_reference.map_or("-", StorageReference::key);
        info!(
            transaction_id = %context.transaction_id,
            storage_reference,
            "Transaction failed"
        );
        Ok(())
    }
}

/// Ledger selected by configuration
#[derive(Debug)]
pub enum Ledger {
    Remote(RemoteLedger),
    LogOnly(LogOnlyLedger),
}

impl Ledger {
    /// `url` selects the ledger service, otherwise outcomes are only logged
    pub fn from_config(config: &LedgerConfig) -> Result<Self, ContractError> {
        match &config.url {
            Some(url) => Ok(Self::Remote(RemoteLedger::new(
                url,
                Duration::from_millis(config.timeout_ms),
            )?)),
            None => {
                warn!("No ledger url configured, finalizations are only logged");
                Ok(Self::LogOnly(LogOnlyLedger))
            }
        }
    }
}

impl TransactionLookup for Ledger {
    async fn exists(&self, transaction_id: &str) -> Result<bool, ContractError> {
        match self {
            Self::Remote(ledger) => ledger.exists(transaction_id).await,
            Self::LogOnly(ledger) => ledger.exists(transaction_id).await,
        }
    }
}

impl TransactionFinalizer for Ledger {
    async fn release(
        &self,
        context: &RequestContext,
        settlement: &Settlement,
    ) -> Result<(), ContractError> {
        match self {
            Self::Remote(ledger) => ledger.release(context, settlement).await,
            Self::LogOnly(ledger) => ledger.release(context, settlement).await,
        }
    }

    async fn fail(
        &self,
        context: &RequestContext,
        storage_reference: Option<&StorageReference>,
    ) -> Result<(), ContractError> {
        match self {
            Self::Remote(ledger) => ledger.fail(context, storage_reference).await,
            Self::LogOnly(ledger) => ledger.fail(context, storage_reference).await,
        }
    }
}
