pub mod memory;
pub mod supabase;

use crate::config::BackendKind;
use crate::models::PendingImage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use memory::{MemoryDocuments, MemoryObjectStore};
pub use supabase::SupabaseClient;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("could not encode document: {0}")]
    Serialize(String),
    #[error("document `{collection}/{id}` does not exist")]
    Missing { collection: String, id: String },
    #[error("upload rejected: {0}")]
    Upload(String),
    #[error("backend misconfigured: {0}")]
    Config(String),
}

/// Fields to write, the names of fields the store must stamp with its own
/// clock, and fields that must no longer exist afterwards.
#[derive(Debug, Clone, Default)]
pub struct DocumentWrite {
    fields: Document,
    server_timestamps: Vec<String>,
    deleted: Vec<String>,
}

impl DocumentWrite {
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(record) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                ..Self::default()
            }),
            Ok(other) => Err(StoreError::Serialize(format!(
                "expected an object, got {other}"
            ))),
            Err(err) => Err(StoreError::Serialize(err.to_string())),
        }
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.server_timestamps.push(field.to_string());
        self
    }

    /// Removes `field` from the stored document, unless this write also
    /// sets it.
    pub fn delete_field(mut self, field: &str) -> Self {
        if !self.fields.contains_key(field) {
            self.deleted.push(field.to_string());
        }
        self
    }

    pub fn deleted_fields(&self) -> &[String] {
        &self.deleted
    }

    pub fn resolve(self, now: DateTime<Utc>) -> Document {
        let mut fields = self.fields;
        for name in self.server_timestamps {
            fields.insert(name, Value::String(now.to_rfc3339()));
        }
        fields
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str)
    -> Result<Option<Document>, StoreError>;

    /// Creates or replaces the whole document.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError>;

    /// Merges fields into an existing document and drops its deleted
    /// fields; fails with [`StoreError::Missing`] when there is none.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProgress {
    Running { transferred: u64, total: u64 },
    Paused { transferred: u64, total: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub file_name: String,
    pub size: u64,
}

/// Caller side of a resumable upload that is already in flight.
pub struct UploadHandle {
    pub progress: mpsc::UnboundedReceiver<UploadProgress>,
    pub completion: oneshot::Receiver<Result<StoredObject, StoreError>>,
}

/// Transport side of an upload: reports progress, then completes exactly once.
pub struct UploadReporter {
    progress: mpsc::UnboundedSender<UploadProgress>,
    completion: oneshot::Sender<Result<StoredObject, StoreError>>,
}

impl UploadHandle {
    pub fn channel() -> (UploadReporter, UploadHandle) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            UploadReporter {
                progress: progress_tx,
                completion: done_tx,
            },
            UploadHandle {
                progress: progress_rx,
                completion: done_rx,
            },
        )
    }
}

impl UploadReporter {
    pub fn progress(&self, update: UploadProgress) {
        // receiver may already be gone; the upload keeps going regardless
        let _ = self.progress.send(update);
    }

    pub fn progress_sender(&self) -> mpsc::UnboundedSender<UploadProgress> {
        self.progress.clone()
    }

    pub fn finish(self, result: Result<StoredObject, StoreError>) {
        let _ = self.completion.send(result);
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Starts the transfer in the background and returns immediately.
    fn start_resumable_upload(&self, key: &str, file: &PendingImage) -> UploadHandle;

    async fn download_url(&self, object: &StoredObject) -> Result<String, StoreError>;
}

/// Explicitly constructed handle to the managed backend, built once by the
/// application root and handed to every controller.
#[derive(Clone)]
pub struct Backend {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Backend {
    pub fn new(documents: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { documents, objects }
    }

    pub fn memory() -> Self {
        Self::new(
            Arc::new(MemoryDocuments::default()),
            Arc::new(MemoryObjectStore::new("memory://listing-desk").with_jitter(250)),
        )
    }

    pub fn from_kind(kind: BackendKind) -> Result<Self, StoreError> {
        match kind {
            BackendKind::Memory => Ok(Self::memory()),
            BackendKind::Supabase => {
                let client = SupabaseClient::from_env().ok_or_else(|| {
                    StoreError::Config(
                        "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set".into(),
                    )
                })?;
                let client = Arc::new(client);
                Ok(Self::new(client.clone(), client))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_resolves_server_timestamps() {
        let write = DocumentWrite::from_record(&json!({ "name": "x" }))
            .unwrap()
            .server_timestamp("timestamp");

        let now = Utc::now();
        let doc = write.resolve(now);
        assert_eq!(doc["name"], json!("x"));
        assert_eq!(doc["timestamp"], json!(now.to_rfc3339()));
    }

    #[test]
    fn deleting_a_field_the_write_sets_is_ignored() {
        let write = DocumentWrite::from_record(&json!({ "offer": false, "name": "x" }))
            .unwrap()
            .delete_field("discountedPrice")
            .delete_field("name");
        assert_eq!(write.deleted_fields(), ["discountedPrice".to_string()]);
    }

    #[test]
    fn write_rejects_non_objects() {
        let err = DocumentWrite::from_record(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, StoreError::Serialize(_)));
    }
}
