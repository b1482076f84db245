use super::{
    Document, DocumentStore, DocumentWrite, ObjectStore, StoreError, StoredObject, UploadHandle,
    UploadProgress,
};
use crate::models::PendingImage;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{sync::RwLock, time::sleep};
use tracing::debug;

type Collections = HashMap<String, HashMap<String, Document>>;

/// Document store kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryDocuments {
    collections: Arc<RwLock<Collections>>,
    reject_writes: Arc<AtomicBool>,
}

impl MemoryDocuments {
    pub async fn insert(&self, collection: &str, id: &str, document: Document) {
        let mut guard = self.collections.write().await;
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let guard = self.collections.read().await;
        guard.get(collection).and_then(|docs| docs.get(id)).cloned()
    }

    #[cfg(test)]
    pub async fn count(&self, collection: &str) -> usize {
        let guard = self.collections.read().await;
        guard.get(collection).map(HashMap::len).unwrap_or(0)
    }

    /// Makes every subsequent write fail, for exercising save errors.
    #[cfg(test)]
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Request("writes are disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.get(collection, id).await)
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.insert(collection, id, write.resolve(Utc::now())).await;
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut guard = self.collections.write().await;
        let existing = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let deleted = write.deleted_fields().to_vec();
        for (field, value) in write.resolve(Utc::now()) {
            existing.insert(field, value);
        }
        for field in deleted {
            existing.remove(&field);
        }
        Ok(())
    }
}

#[derive(Default)]
struct ObjectScript {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    published: HashMap<String, String>,
    max_jitter_ms: u64,
}

struct ObjectsInner {
    base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    script: Mutex<ObjectScript>,
    started: AtomicUsize,
}

/// Object store kept in process memory. Uploads run on spawned tasks and can
/// be scripted per file name to finish late or fail.
#[derive(Clone)]
pub struct MemoryObjectStore {
    inner: Arc<ObjectsInner>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ObjectsInner {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                objects: Mutex::new(HashMap::new()),
                script: Mutex::new(ObjectScript::default()),
                started: AtomicUsize::new(0),
            }),
        }
    }

    #[cfg(test)]
    pub fn delay(&self, file_name: &str, delay: Duration) {
        self.script().delays.insert(file_name.to_string(), delay);
    }

    #[cfg(test)]
    pub fn fail(&self, file_name: &str) {
        self.script().failures.insert(file_name.to_string());
    }

    /// Pins the download URL handed out for uploads of `file_name`.
    #[cfg(test)]
    pub fn publish_as(&self, file_name: &str, url: &str) {
        self.script()
            .published
            .insert(file_name.to_string(), url.to_string());
    }

    /// Adds a random delay of up to `max_ms` to every upload.
    pub fn with_jitter(self, max_ms: u64) -> Self {
        self.script().max_jitter_ms = max_ms;
        self
    }

    #[cfg(test)]
    pub fn uploads_started(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn stored_keys(&self) -> Vec<String> {
        let guard = self
            .inner
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn script(&self) -> std::sync::MutexGuard<'_, ObjectScript> {
        self.inner
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn start_resumable_upload(&self, key: &str, file: &PendingImage) -> UploadHandle {
        self.inner.started.fetch_add(1, Ordering::SeqCst);
        let (reporter, handle) = UploadHandle::channel();
        let (delay, fails) = {
            let script = self.script();
            let mut delay = script
                .delays
                .get(&file.file_name)
                .copied()
                .unwrap_or_default();
            if script.max_jitter_ms > 0 {
                delay += Duration::from_millis(rand::rng().random_range(0..=script.max_jitter_ms));
            }
            (delay, script.failures.contains(&file.file_name))
        };

        let inner = self.inner.clone();
        let key = key.to_string();
        let file_name = file.file_name.clone();
        let bytes = file.bytes.clone();
        tokio::spawn(async move {
            let total = bytes.len() as u64;
            reporter.progress(UploadProgress::Running {
                transferred: 0,
                total,
            });
            sleep(delay / 2).await;
            reporter.progress(UploadProgress::Paused {
                transferred: total / 2,
                total,
            });
            reporter.progress(UploadProgress::Running {
                transferred: total / 2,
                total,
            });
            sleep(delay - delay / 2).await;

            if fails {
                debug!(target = "listing_desk.store", key = %key, "scripted upload failure");
                reporter.finish(Err(StoreError::Upload(format!(
                    "transfer of {file_name} was rejected"
                ))));
                return;
            }

            inner
                .objects
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(key.clone(), bytes);
            reporter.finish(Ok(StoredObject {
                key,
                file_name,
                size: total,
            }));
        });
        handle
    }

    async fn download_url(&self, object: &StoredObject) -> Result<String, StoreError> {
        let published = self.script().published.get(&object.file_name).cloned();
        if let Some(url) = published {
            return Ok(url);
        }
        let stored = self
            .inner
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&object.key);
        if !stored {
            return Err(StoreError::Missing {
                collection: "objects".into(),
                id: object.key.clone(),
            });
        }
        Ok(format!("{}/{}", self.inner.base_url, object.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn update_merges_and_stamps() {
        let store = MemoryDocuments::default();
        store
            .insert("listings", "l-1", doc(json!({ "name": "old", "bedrooms": 2 })))
            .await;

        let write = DocumentWrite::from_record(&json!({ "name": "new" }))
            .unwrap()
            .server_timestamp("timestamp");
        store.update_document("listings", "l-1", write).await.unwrap();

        let stored = store.get("listings", "l-1").await.unwrap();
        assert_eq!(stored["name"], json!("new"));
        assert_eq!(stored["bedrooms"], json!(2));
        assert!(stored["timestamp"].is_string());
    }

    #[tokio::test]
    async fn update_drops_deleted_fields() {
        let store = MemoryDocuments::default();
        store
            .insert(
                "listings",
                "l-1",
                doc(json!({ "offer": true, "discountedPrice": 18000 })),
            )
            .await;

        let write = DocumentWrite::from_record(&json!({ "offer": false }))
            .unwrap()
            .delete_field("discountedPrice");
        store.update_document("listings", "l-1", write).await.unwrap();

        let stored = store.get("listings", "l-1").await.unwrap();
        assert_eq!(stored["offer"], json!(false));
        assert!(!stored.contains_key("discountedPrice"));
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let store = MemoryDocuments::default();
        let write = DocumentWrite::from_record(&json!({ "name": "x" })).unwrap();
        let err = store
            .update_document("listings", "nope", write)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn upload_reports_progress_then_url() {
        let store = MemoryObjectStore::new("https://objects.test/");
        let file = PendingImage::new("a.jpg", "image/jpeg", Bytes::from_static(b"abcd"));
        let mut handle = store.start_resumable_upload("images/u-a.jpg-1", &file);

        let object = (&mut handle.completion).await.unwrap().unwrap();
        let first = handle.progress.recv().await;
        assert!(matches!(first, Some(UploadProgress::Running { transferred: 0, total: 4 })));
        assert_eq!(object.size, 4);
        assert_eq!(
            store.download_url(&object).await.unwrap(),
            "https://objects.test/images/u-a.jpg-1"
        );
        assert_eq!(store.uploads_started(), 1);
    }
}
