mod backend;
mod config;
mod contact;
mod form;
mod http;
mod idempotency;
mod metrics;
mod models;
mod security;
mod session;
mod shell;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use backend::Backend;
use config::AppConfig;
use contact::LandlordContact;
use form::{FieldInput, FormContext, FormError, FormMode, FormPhase, ListingForm};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, Landlord, ListingDraft, PendingImage, PersistedListing};
use security::{AuthState, require_session};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use session::{SessionUser, WatchSession};
use shell::{Notice, RecordingShell, ShellLog};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const ACCEPTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "listing_desk.api", "server crashed: {err:#}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Arc::new(AppConfig::from_env());
    let backend = Backend::from_kind(config.backend)?;
    info!(target = "listing_desk.api", backend = ?config.backend, "backend initialised");

    let auth_state = AuthState::from_env();
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let redis = config
        .redis_url
        .as_deref()
        .and_then(|url| redis::Client::open(url).ok());
    let openapi: Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({ "openapi": "3.0.3" }));
    let shutdown = CancellationToken::new();

    let state = AppState {
        backend,
        shutdown: shutdown.clone(),
        openapi: Arc::new(openapi),
        idempotency: Arc::new(Mutex::new(HashMap::new())),
        prometheus_handle,
        redis,
        config: config.clone(),
    };

    let app = router(state, auth_state);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "listing_desk.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

fn router(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);
    let body_limit = state.config.body_limit;

    let protected = Router::new()
        .route("/listings", post(create_listing))
        .route("/listings/{id}", put(update_listing))
        .route("/listings/{id}/edit", get(edit_form))
        .route_layer(middleware::from_fn_with_state(auth_state, require_session));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/landlords/{id}/contact", get(landlord_contact))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

#[derive(Clone)]
struct AppState {
    backend: Backend,
    /// Parent of every form's cancellation token.
    shutdown: CancellationToken,
    openapi: Arc<Value>,
    idempotency: Arc<Mutex<HashMap<String, SubmitResponse>>>,
    prometheus_handle: PrometheusHandle,
    redis: Option<redis::Client>,
    config: Arc<AppConfig>,
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "listing_desk.api", "could not listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!(target = "listing_desk.api", "shutting down; closing open forms");
    shutdown.cancel();
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "listing-desk",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<Value> {
    Json((*state.openapi).clone())
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.config.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct EditFormResponse {
    phase: FormPhase,
    loading: bool,
    draft: ListingDraft,
    notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubmitResponse {
    listing_id: String,
    redirect: String,
    listing: PersistedListing,
    notices: Vec<Notice>,
}

/// Load a listing for editing.
///
/// - Method: `GET`
/// - Path: `/listings/{id}/edit`
/// - Auth: `Authorization: Bearer <token>` or `X-Listing-Token: <token>`
/// - Response: the draft to render, or an error carrying the redirect target
async fn edit_form(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<String>,
) -> Result<Json<EditFormResponse>, AppError> {
    crate::metrics::inc_requests("/listings/{id}/edit");
    let shell = RecordingShell::new();
    let mut form = form_for(&state, user, FormMode::edit(id), &shell);
    form.open()
        .await
        .map_err(|err| AppError::form(err, &shell))?;

    let response = EditFormResponse {
        phase: form.phase(),
        loading: form.is_loading(),
        draft: (*form.draft()).clone(),
        notices: shell.snapshot().notices,
    };
    form.close();
    Ok(Json(response))
}

/// Create a listing.
///
/// - Method: `POST`
/// - Path: `/listings`
/// - Body: `multipart/form-data`; one part per form field, `images` parts for files
/// - Optional `Idempotency-Key` header
async fn create_listing(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError> {
    crate::metrics::inc_requests("/listings");
    submit_once(&state, user, FormMode::Create, &headers, multipart)
        .await
        .map(Json)
}

/// Save changes to an existing listing. Only its owner may do so.
///
/// - Method: `PUT`
/// - Path: `/listings/{id}`
/// - Body: `multipart/form-data`, fields applied over the stored listing
async fn update_listing(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError> {
    crate::metrics::inc_requests("/listings/{id}");
    submit_once(&state, user, FormMode::edit(id), &headers, multipart)
        .await
        .map(Json)
}

async fn submit_once(
    state: &AppState,
    user: SessionUser,
    mode: FormMode,
    headers: &HeaderMap,
    multipart: Multipart,
) -> Result<SubmitResponse, AppError> {
    let Some(key) = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        let inputs = read_form_fields(multipart).await?;
        return submit(state, user, mode, inputs).await;
    };

    let cache_key = idempotency::cache_key(&user.id, mode.listing_id(), &key);
    if let Some(client) = &state.redis {
        if let Some(existing) = idempotency::redis_get(client, &cache_key).await {
            return Ok(existing);
        }
    } else if let Some(existing) = state.idempotency.lock().await.get(&cache_key).cloned() {
        return Ok(existing);
    }

    let inputs = read_form_fields(multipart).await?;
    let response = submit(state, user, mode, inputs).await?;
    if let Some(client) = &state.redis {
        idempotency::redis_set(
            client,
            &cache_key,
            &response,
            state.config.idempotency_ttl_secs,
        )
        .await;
    } else {
        state
            .idempotency
            .lock()
            .await
            .insert(cache_key, response.clone());
    }
    Ok(response)
}

async fn submit(
    state: &AppState,
    user: SessionUser,
    mode: FormMode,
    inputs: Vec<FieldInput>,
) -> Result<SubmitResponse, AppError> {
    let shell = RecordingShell::new();
    let mut form = form_for(state, user, mode, &shell);
    let outcome = async {
        form.open().await?;
        for input in inputs {
            form.mutate(input)?;
        }
        form.submit().await
    }
    .await;
    form.close();

    match outcome {
        Ok(receipt) => Ok(SubmitResponse {
            listing_id: receipt.listing_id,
            redirect: receipt.redirect,
            listing: receipt.listing,
            notices: shell.snapshot().notices,
        }),
        Err(err) => Err(AppError::form(err, &shell)),
    }
}

fn form_for(
    state: &AppState,
    user: SessionUser,
    mode: FormMode,
    shell: &RecordingShell,
) -> ListingForm {
    ListingForm::new(
        mode,
        FormContext {
            backend: state.backend.clone(),
            session: Arc::new(WatchSession::signed_in(user)),
            navigator: Arc::new(shell.clone()),
            notifier: Arc::new(shell.clone()),
            cancel: state.shutdown.child_token(),
        },
    )
}

async fn read_form_fields(mut multipart: Multipart) -> Result<Vec<FieldInput>, AppError> {
    let mut inputs = Vec::new();
    let mut images = Vec::new();
    let mut saw_files = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("multipart error: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != "images" {
            let value = field
                .text()
                .await
                .map_err(|err| AppError::BadRequest(format!("failed to read `{name}`: {err}")))?;
            inputs.push(FieldInput::value(name, value));
            continue;
        }

        saw_files = true;
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(format!("failed to read `{file_name}`: {err}")))?;
        // browsers send an empty part when no file was picked
        if bytes.is_empty() && file_name.is_empty() {
            continue;
        }
        if !accepted_image(&file_name) {
            return Err(AppError::BadRequest(format!(
                "`{file_name}` is not a .jpg, .jpeg or .png image"
            )));
        }
        images.push(PendingImage::new(file_name, content_type, bytes));
    }

    if saw_files {
        inputs.push(FieldInput::Files(images));
    }
    Ok(inputs)
}

fn accepted_image(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            ACCEPTED_IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactQuery {
    #[serde(default)]
    listing_name: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct ContactResponse {
    landlord: Landlord,
    mailto: String,
}

/// Landlord details plus a ready-made `mailto:` link.
///
/// - Method: `GET`
/// - Path: `/landlords/{id}/contact?listingName=..&message=..`
/// - Auth: none
async fn landlord_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ContactQuery>,
) -> Result<Json<ContactResponse>, AppError> {
    crate::metrics::inc_requests("/landlords/{id}/contact");
    let shell = RecordingShell::new();
    let contact = LandlordContact::new(state.backend.documents.clone(), Arc::new(shell.clone()));
    let Some(landlord) = contact.load(&id).await else {
        return Err(AppError::NotFound {
            code: "landlord_not_found",
            log: shell.snapshot(),
        });
    };
    let mailto = contact::mailto(&landlord, &query.listing_name, &query.message);
    Ok(Json(ContactResponse { landlord, mailto }))
}

#[derive(Debug)]
enum AppError {
    Form { error: FormError, log: ShellLog },
    NotFound { code: &'static str, log: ShellLog },
    BadRequest(String),
}

impl AppError {
    fn form(error: FormError, shell: &RecordingShell) -> Self {
        Self::Form {
            error,
            log: shell.snapshot(),
        }
    }
}

fn form_error_status(error: &FormError) -> (StatusCode, &'static str) {
    match error {
        FormError::NotFound(_) => (StatusCode::NOT_FOUND, "listing_not_found"),
        FormError::LoadFailed(_) => (StatusCode::BAD_GATEWAY, "listing_load_failed"),
        FormError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "not_listing_owner"),
        FormError::SignedOut => (StatusCode::UNAUTHORIZED, "signed_out"),
        FormError::Field(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_field"),
        FormError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
        FormError::Upload(_) => (StatusCode::BAD_GATEWAY, "upload_failed"),
        FormError::Persistence(_) => (StatusCode::BAD_GATEWAY, "persistence_failed"),
        FormError::NotReady(_) => (StatusCode::CONFLICT, "form_not_ready"),
        FormError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::Form { error, log } => {
                let (status, code) = form_error_status(&error);
                let payload = ApiError {
                    error: code.to_string(),
                    detail: Some(error.to_string()),
                    redirect: log.redirect,
                    notices: log.notices,
                };
                (status, payload)
            }
            AppError::NotFound { code, log } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: code.to_string(),
                    detail: None,
                    redirect: log.redirect,
                    notices: log.notices,
                },
            ),
            AppError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: "bad_request".to_string(),
                    detail: Some(detail),
                    redirect: None,
                    notices: Vec::new(),
                },
            ),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryDocuments, MemoryObjectStore};
    use crate::config::BackendKind;
    use crate::models::{LISTINGS, USERS};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use form::ValidationError;
    use tower::ServiceExt;

    const BOUNDARY: &str = "listing-desk-boundary";

    struct TestApp {
        documents: MemoryDocuments,
        router: Router,
    }

    fn test_app() -> TestApp {
        let documents = MemoryDocuments::default();
        let backend = Backend::new(
            Arc::new(documents.clone()),
            Arc::new(MemoryObjectStore::new("https://store")),
        );
        let state = AppState {
            backend,
            shutdown: CancellationToken::new(),
            openapi: Arc::new(json!({ "openapi": "3.0.3" })),
            idempotency: Arc::new(Mutex::new(HashMap::new())),
            prometheus_handle: PrometheusBuilder::new().build_recorder().handle(),
            redis: None,
            config: Arc::new(AppConfig {
                port: 0,
                backend: BackendKind::Memory,
                body_limit: 1024 * 1024,
                redis_url: None,
                idempotency_ttl_secs: 60,
                metrics_key: Some("m-key".into()),
            }),
        };
        TestApp {
            documents,
            router: router(state, AuthState::from_tokens("alice:t-alice,bob:t-bob")),
        }
    }

    fn multipart_body(fields: &[(&str, &str)], files: &[&str]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        for file in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{file}\"\r\nContent-Type: image/jpeg\r\n\r\njpeg-bytes\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn valid_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("type", "rent"),
            ("name", "Cozy Apartment"),
            ("bedrooms", "2"),
            ("bathrooms", "1"),
            ("parking", "false"),
            ("furnished", "false"),
            ("offer", "false"),
            ("address", "12 Main St"),
            ("latitude", "1.0"),
            ("longitude", "2.0"),
            ("regularPrice", "15000"),
        ]
    }

    fn form_request(method: &str, uri: &str, token: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed_listing(documents: &MemoryDocuments, id: &str, owner: &str) {
        let document = json!({
            "type": "sale",
            "name": "Family house with garden",
            "bedrooms": 3,
            "bathrooms": 2,
            "parking": true,
            "furnished": false,
            "offer": false,
            "regularPrice": 250000,
            "location": "7 Oak Road",
            "geolocation": { "lat": 1.5, "lng": 2.5 },
            "imgUrls": ["https://store/old"],
            "userRef": owner
        });
        documents
            .insert(LISTINGS, id, document.as_object().cloned().unwrap())
            .await;
    }

    #[test]
    fn accepts_only_listed_image_types() {
        assert!(accepted_image("front.JPG"));
        assert!(accepted_image("plan.png"));
        assert!(!accepted_image("notes.pdf"));
        assert!(!accepted_image("no-extension"));
    }

    #[test]
    fn form_errors_map_to_statuses() {
        let (status, code) =
            form_error_status(&FormError::Validation(ValidationError::TooManyImages));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "validation_failed");
        let (status, _) = form_error_status(&FormError::Unauthorized {
            owner: "a".into(),
            user: "b".into(),
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            form_error_status(&FormError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_require_key_when_configured() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn listing_routes_redirect_anonymous_users_to_sign_in() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/listings/l-1/edit").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/sign-in");
    }

    #[tokio::test]
    async fn create_stores_listing_and_returns_redirect() {
        let app = test_app();
        let body = multipart_body(&valid_fields(), &["imgA.jpg"]);
        let response = app
            .router
            .oneshot(form_request("POST", "/listings", "t-alice", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let id = body["listing_id"].as_str().unwrap().to_string();
        assert_eq!(body["redirect"], format!("/category/rent/{id}"));
        assert_eq!(body["listing"]["userRef"], "alice");
        assert!(body["listing"].get("discountedPrice").is_none());
        assert_eq!(body["notices"][0]["level"], "success");
        assert!(app.documents.get(LISTINGS, &id).await.is_some());
    }

    #[tokio::test]
    async fn create_rejects_more_than_five_images() {
        let app = test_app();
        let files = ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg", "f.jpg"];
        let body = multipart_body(&valid_fields(), &files);
        let response = app
            .router
            .oneshot(form_request("POST", "/listings", "t-alice", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["notices"][0]["message"], "Maximum 5 images are allowed");
        assert_eq!(app.documents.count(LISTINGS).await, 0);
    }

    #[tokio::test]
    async fn create_rejects_non_image_files() {
        let app = test_app();
        let body = multipart_body(&valid_fields(), &["lease.pdf"]);
        let response = app
            .router
            .oneshot(form_request("POST", "/listings", "t-alice", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn replayed_idempotency_key_creates_once() {
        let app = test_app();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let mut request = form_request(
                "POST",
                "/listings",
                "t-alice",
                multipart_body(&valid_fields(), &["imgA.jpg"]),
            );
            request
                .headers_mut()
                .insert("Idempotency-Key", "submit-1".parse().unwrap());
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            ids.push(json_body(response).await["listing_id"].clone());
        }
        assert_eq!(ids[0], ids[1]);
        assert_eq!(app.documents.count(LISTINGS).await, 1);
    }

    #[tokio::test]
    async fn reused_idempotency_key_on_another_listing_still_saves_it() {
        let app = test_app();
        seed_listing(&app.documents, "l-1", "alice").await;
        seed_listing(&app.documents, "l-2", "alice").await;

        for (id, name) in [("l-1", "First house renamed"), ("l-2", "Second house renamed")] {
            let mut request = form_request(
                "PUT",
                &format!("/listings/{id}"),
                "t-alice",
                multipart_body(&[("name", name)], &["new.png"]),
            );
            request
                .headers_mut()
                .insert("Idempotency-Key", "k-1".parse().unwrap());
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["listing_id"], id);
        }

        let second = app.documents.get(LISTINGS, "l-2").await.unwrap();
        assert_eq!(second["name"], "Second house renamed");
    }

    #[tokio::test]
    async fn edit_form_is_refused_to_other_users() {
        let app = test_app();
        seed_listing(&app.documents, "l-1", "alice").await;
        let response = app
            .router
            .oneshot(
                Request::get("/listings/l-1/edit")
                    .header("X-Listing-Token", "t-bob")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/");
        assert_eq!(body["notices"][0]["message"], "You can not edit that listing");
    }

    #[tokio::test]
    async fn owner_gets_prefilled_draft_and_can_save() {
        let app = test_app();
        seed_listing(&app.documents, "l-1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/listings/l-1/edit")
                    .header("X-Listing-Token", "t-alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["phase"], "ready");
        assert_eq!(body["draft"]["name"], "Family house with garden");

        let body = multipart_body(&[("name", "Family house with a big garden")], &["new.png"]);
        let response = app
            .router
            .oneshot(form_request("PUT", "/listings/l-1", "t-alice", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/category/sale/l-1");
        let stored = app.documents.get(LISTINGS, "l-1").await.unwrap();
        assert_eq!(stored["name"], "Family house with a big garden");
        assert_eq!(stored["imgUrls"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let app = test_app();
        let response = app
            .router
            .oneshot(
                Request::get("/listings/ghost/edit")
                    .header("X-Listing-Token", "t-alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn contact_builds_mailto_link() {
        let app = test_app();
        app.documents
            .insert(
                USERS,
                "alice",
                json!({ "name": "Alice", "email": "alice@example.com" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await;
        let response = app
            .router
            .oneshot(
                Request::get("/landlords/alice/contact?listingName=Oak%20Road&message=Hi")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["mailto"],
            "mailto:alice@example.com?Subject=Oak%20Road&body=Hi"
        );
    }
}
