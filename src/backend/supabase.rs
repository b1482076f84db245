use super::{
    Document, DocumentStore, DocumentWrite, ObjectStore, StoreError, StoredObject, UploadHandle,
    UploadProgress,
};
use crate::config::SUPABASE_BUCKET;
use crate::http::build_client;
use crate::models::PendingImage;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::{Body, Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;

/// Document and object store backed by a Supabase project: PostgREST tables
/// keyed by an `id` column, and a Storage bucket for images.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    bucket: String,
    http: Client,
}

impl SupabaseClient {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket: SUPABASE_BUCKET.clone(),
            http: build_client(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, encode(collection))
    }

    fn object_path(&self, key: &str) -> String {
        let encoded = key.split('/').map(encode).collect::<Vec<_>>().join("/");
        format!("{}/{}", encode(&self.bucket), encoded)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Request(format!("HTTP {status}: {body}")))
}

fn row_with_id(id: &str, mut fields: Document) -> Document {
    fields.insert("id".into(), Value::String(id.to_string()));
    fields
}

// PostgREST leaves columns missing from the payload untouched, so deleted
// fields are sent as NULL.
fn row_for(write: DocumentWrite) -> Document {
    let deleted = write.deleted_fields().to_vec();
    let mut row = write.resolve(Utc::now());
    for field in deleted {
        row.insert(field, Value::Null);
    }
    row
}

#[async_trait]
impl DocumentStore for SupabaseClient {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let url = format!(
            "{}?id=eq.{}&select=*&limit=1",
            self.table_url(collection),
            encode(id)
        );
        let response = self
            .authed(self.http.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        let response = check_status(response).await?;

        let mut rows: Vec<Document> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        Ok(rows.pop())
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        let row = row_with_id(id, row_for(write));
        let response = self
            .authed(self.http.post(self.table_url(collection)))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        check_status(response).await?;
        debug!(target = "listing_desk.store", collection, id, "document set");
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        let url = format!("{}?id=eq.{}", self.table_url(collection), encode(id));
        let response = self
            .authed(self.http.patch(url))
            .header("Prefer", "return=representation")
            .json(&row_for(write))
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        let response = check_status(response).await?;

        let touched: Vec<Document> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        if touched.is_empty() {
            return Err(StoreError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    fn start_resumable_upload(&self, key: &str, file: &PendingImage) -> UploadHandle {
        let (reporter, handle) = UploadHandle::channel();
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.object_path(key));
        let request = self
            .authed(self.http.post(url))
            .header("Content-Type", file.content_type.clone())
            .header("x-upsert", "false");
        let key = key.to_string();
        let file_name = file.file_name.clone();
        let bytes = file.bytes.clone();

        tokio::spawn(async move {
            let total = bytes.len() as u64;
            let chunks: Vec<_> = (0..bytes.len())
                .step_by(UPLOAD_CHUNK_BYTES)
                .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_BYTES).min(bytes.len())))
                .collect();
            let progress = reporter.progress_sender();
            let mut transferred = 0u64;
            let body = stream::iter(chunks).map(move |chunk| {
                let _ = progress.send(UploadProgress::Running { transferred, total });
                transferred += chunk.len() as u64;
                Ok::<_, std::io::Error>(chunk)
            });

            let result = match request.body(Body::wrap_stream(body)).send().await {
                Ok(response) => check_status(response).await.map(|_| StoredObject {
                    key: key.clone(),
                    file_name,
                    size: total,
                }),
                Err(err) => Err(StoreError::Upload(err.to_string())),
            };
            if let Err(err) = &result {
                warn!(target = "listing_desk.store", key = %key, error = %err, "object upload failed");
            }
            reporter.finish(result);
        });
        handle
    }

    async fn download_url(&self, object: &StoredObject) -> Result<String, StoreError> {
        Ok(format!(
            "{}/storage/v1/object/public/{}",
            self.base_url,
            self.object_path(&object.key)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient {
            base_url: "https://project.supabase.co".into(),
            service_key: "service".into(),
            bucket: "listing-images".into(),
            http: Client::new(),
        }
    }

    #[tokio::test]
    async fn public_url_encodes_each_segment() {
        let object = StoredObject {
            key: "images/u1-my house.jpg-abc".into(),
            file_name: "my house.jpg".into(),
            size: 1,
        };
        let url = client().download_url(&object).await.unwrap();
        assert_eq!(
            url,
            "https://project.supabase.co/storage/v1/object/public/listing-images/images/u1-my%20house.jpg-abc"
        );
    }

    #[test]
    fn rows_carry_their_id() {
        let row = row_with_id("l-9", Document::new());
        assert_eq!(row["id"], Value::String("l-9".into()));
    }

    #[test]
    fn deleted_fields_are_sent_as_null() {
        let write = DocumentWrite::from_record(&serde_json::json!({ "offer": false }))
            .unwrap()
            .delete_field("discountedPrice");
        let row = row_for(write);
        assert_eq!(row["offer"], Value::Bool(false));
        assert_eq!(row.get("discountedPrice"), Some(&Value::Null));
    }
}
