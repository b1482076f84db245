use crate::models::ApiError;
use crate::session::SessionUser;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

/// Maps bearer tokens to the user they sign in.
#[derive(Clone)]
pub struct AuthState {
    users: Arc<HashMap<String, String>>,
}

impl AuthState {
    pub fn from_env() -> Self {
        Self::from_tokens(&env::var("LISTING_DESK_TOKENS").unwrap_or_default())
    }

    pub fn from_tokens(raw: &str) -> Self {
        Self {
            users: Arc::new(parse_tokens(raw)),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<SessionUser> {
        self.users.get(presented).map(SessionUser::new)
    }
}

pub async fn require_session(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_token(request.headers()) else {
        return Ok(unauthorized_response(
            "missing_token",
            "Provide X-Listing-Token or Bearer token",
        ));
    };

    let Some(user) = state.authenticate(&presented) else {
        return Ok(unauthorized_response("invalid_token", "Token not recognized"));
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn extract_token(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Listing-Token")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
        redirect: Some(crate::form::SIGN_IN_ROUTE.to_string()),
        notices: Vec::new(),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

// `user:token` pairs separated by commas.
fn parse_tokens(raw: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let user = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let token = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (user, token) {
            (Some(user), Some(token)) => {
                entries.insert(token.to_string(), user.to_string());
            }
            _ => warn!(
                target = "listing_desk.api",
                "ignored malformed LISTING_DESK_TOKENS entry: {trimmed}"
            ),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "listing_desk.api",
            "LISTING_DESK_TOKENS produced no tokens; falling back to demo-user:demo-token"
        );
        entries.insert("demo-token".to_string(), "demo-user".to_string());
    } else {
        info!(
            target = "listing_desk.api",
            token_count = entries.len(),
            "loaded session tokens from env"
        );
    }
    entries
}
