use crate::config::parse_env;
use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client for backend calls. Timeouts come from
/// `HTTP_TIMEOUT_SECS` (uploads included) and `HTTP_CONNECT_TIMEOUT_SECS`.
pub fn build_client() -> Client {
    let timeout = parse_env::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(60);
    let connect = parse_env::<u64>("HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5);
    Client::builder()
        .user_agent(concat!("listing-desk/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
