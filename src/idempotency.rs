use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};

// Replayed submissions return the stored response instead of uploading and
// writing a second time.

/// Keys are scoped to the submission target so one client key reused on
/// another listing is a new submission.
pub fn cache_key(user_id: &str, listing_id: Option<&str>, key: &str) -> String {
    match listing_id {
        Some(id) => format!("listing-desk:submit:{user_id}:listing/{id}:{key}"),
        None => format!("listing-desk:submit:{user_id}:create:{key}"),
    }
}

pub async fn redis_get<T: DeserializeOwned>(client: &redis::Client, key: &str) -> Option<T> {
    let mut conn = match client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(_) => return None,
    };
    let s: Option<String> = conn.get(key).await.ok();
    s.and_then(|v| serde_json::from_str(&v).ok())
}

pub async fn redis_set<T: Serialize>(client: &redis::Client, key: &str, value: &T, ttl_secs: u64) {
    if let Ok(mut conn) = client.get_multiplexed_async_connection().await
        && let Ok(json) = serde_json::to_string(value)
    {
        let _: Result<(), _> = conn.set_ex(key, json, ttl_secs).await;
    }
}
