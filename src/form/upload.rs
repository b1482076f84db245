use crate::backend::{ObjectStore, StoreError, UploadHandle, UploadProgress};
use crate::models::PendingImage;
use futures::future::join_all;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Queued,
    Running,
    Paused,
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("upload of `{file_name}` (#{index}) failed: {reason}")]
pub struct UploadFailure {
    pub index: usize,
    pub file_name: String,
    pub reason: String,
}

/// Storage key for one image: owner, original name and a random suffix so
/// two uploads never collide.
pub fn storage_key(user_id: &str, file_name: &str) -> String {
    format!("images/{user_id}-{file_name}-{}", Uuid::new_v4())
}

/// Uploads every file concurrently and waits for all of them.
///
/// Returns the download URLs in the order of `files`, whatever order the
/// transfers finished in. A single failed transfer fails the whole batch and
/// no URL is returned.
pub async fn upload_all(
    objects: Arc<dyn ObjectStore>,
    user_id: &str,
    files: &[PendingImage],
) -> Result<Vec<String>, UploadFailure> {
    let started = Instant::now();
    let tasks = files.iter().enumerate().map(|(index, file)| {
        let key = storage_key(user_id, &file.file_name);
        let handle = objects.start_resumable_upload(&key, file);
        track(objects.clone(), index, file.file_name.clone(), key, handle)
    });
    let outcomes = join_all(tasks).await;

    let mut urls = Vec::with_capacity(outcomes.len());
    let mut failure = None;
    for outcome in outcomes {
        match outcome {
            Ok(url) => urls.push(url),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::upload_batch(files.len(), elapsed_ms, failure.is_none());
    match failure {
        Some(err) => {
            warn!(
                target = "listing_desk.upload",
                files = files.len(),
                error = %err,
                "image batch failed"
            );
            Err(err)
        }
        None => {
            info!(
                target = "listing_desk.upload",
                files = files.len(),
                elapsed_ms = elapsed_ms as u64,
                "image batch uploaded"
            );
            Ok(urls)
        }
    }
}

async fn track(
    objects: Arc<dyn ObjectStore>,
    index: usize,
    file_name: String,
    key: String,
    mut handle: UploadHandle,
) -> Result<String, UploadFailure> {
    let mut state = UploadState::Queued;
    let completion = loop {
        tokio::select! {
            biased;
            Some(progress) = handle.progress.recv() => {
                let next = match progress {
                    UploadProgress::Running { .. } => UploadState::Running,
                    UploadProgress::Paused { .. } => UploadState::Paused,
                };
                if next != state {
                    debug!(target = "listing_desk.upload", index, key = %key, state = ?next, ?progress, "upload state changed");
                    state = next;
                }
            }
            done = &mut handle.completion => break done,
        }
    };

    let result = match completion {
        Ok(Ok(object)) => objects.download_url(&object).await,
        Ok(Err(err)) => Err(err),
        Err(_) => Err(StoreError::Upload("transfer ended without a result".into())),
    };
    state = match &result {
        Ok(url) => UploadState::Succeeded(url.clone()),
        Err(err) => UploadState::Failed(err.to_string()),
    };
    debug!(target = "listing_desk.upload", index, key = %key, state = ?state, "upload finished");

    result.map_err(|err| UploadFailure {
        index,
        file_name,
        reason: err.to_string(),
    })
}
