//! Envelope storage
//!
//! - `FileEnvelopeStorage`: writes envelopes to disk with folder structure
//! - `MemoryStorage`: keeps references in memory (tests)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, instrument};

use contracts::{
    ContractError, EnvelopeStorage, MessageEnvelope, RequestContext, StorageReference,
};

/// Directory for outbound envelopes under the base path
const OUTBOUND_DIR: &str = "out";

/// Writes `<base>/out/<transaction_id>/<request_id>.<ext>` plus a
/// `<request_id>.meta.json` sidecar.
///
/// The key only depends on the request, so uploading twice overwrites the
/// same files and returns the same reference.
#[derive(Debug, Clone)]
pub struct FileEnvelopeStorage {
    base_path: PathBuf,
}

impl FileEnvelopeStorage {
    /// Create the storage, creating the base directory if it doesn't exist
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_for(context: &RequestContext, envelope: &MessageEnvelope) -> String {
        format!(
            "{OUTBOUND_DIR}/{}/{}.{}",
            path_segment(&context.transaction_id),
            context.request_id,
            envelope.payload_extension()
        )
    }

    async fn write_envelope(
        &self,
        key: &str,
        context: &RequestContext,
        envelope: &MessageEnvelope,
    ) -> std::io::Result<()> {
        let payload_path = self.base_path.join(key);
        if let Some(dir) = payload_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&payload_path, &envelope.raw_payload).await?;

        let meta = json!({
            "request_id": context.request_id,
            "transaction_id": context.transaction_id,
            "requested_at": context.requested_at,
            "stored_at": Utc::now(),
            "content_type": envelope.content_type.as_str(),
            "message_type": envelope.message_type,
            "message_version": envelope.message_version,
        });
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(payload_path.with_extension("meta.json"), meta_bytes).await?;

        Ok(())
    }
}

impl EnvelopeStorage for FileEnvelopeStorage {
    #[instrument(
        name = "file_storage_upload",
        skip(self, context, envelope),
        fields(request_id = %context.request_id)
    )]
    async fn upload_outbound(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
    ) -> Result<StorageReference, ContractError> {
        let key = Self::key_for(context, envelope);
        self.write_envelope(&key, context, envelope)
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "Upload failed");
                ContractError::storage(format!("failed to write '{key}': {e}"))
            })?;

        debug!(key = %key, bytes = envelope.raw_payload.len(), "Envelope stored");
        Ok(StorageReference::new(key))
    }
}

/// Keep transaction ids from escaping the outbound directory
fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

/// In-memory storage recording every upload
#[derive(Debug, Default)]
pub struct MemoryStorage {
    uploads: Mutex<Vec<StorageReference>>,
    fail: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose uploads always fail
    pub fn failing() -> Self {
        let storage = Self::default();
        storage.set_failing(true);
        storage
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<StorageReference> {
        self.uploads.lock().unwrap().clone()
    }
}

impl EnvelopeStorage for MemoryStorage {
    async fn upload_outbound(
        &self,
        context: &RequestContext,
        _envelope: &MessageEnvelope,
    ) -> Result<StorageReference, ContractError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::storage("mock failure"));
        }
        let reference = StorageReference::new(format!(
            "memory/{}/{}",
            context.transaction_id, context.request_id
        ));
        self.uploads.lock().unwrap().push(reference.clone());
        Ok(reference)
    }
}
