//! Listing create/edit form controller.
//!
//! A [`ListingForm`] owns one draft for the lifetime of one editing session.
//! In edit mode it loads the stored listing and waits for the auth session,
//! in whichever order they arrive, before the owner guard lets the form
//! render. Submitting validates the draft, uploads the selected images and
//! writes the assembled record in one go.

pub mod fields;
pub mod upload;
pub mod validate;

use crate::backend::{Backend, Document, DocumentWrite, StoreError};
use crate::models::{LISTINGS, ListingDraft, PersistedListing};
use crate::session::{SessionProvider, SessionState};
use crate::shell::{Navigator, Notifier};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use fields::{FieldError, FieldInput};
pub use upload::UploadFailure;
pub use validate::ValidationError;

pub const HOME_ROUTE: &str = "/";
pub const SIGN_IN_ROUTE: &str = "/sign-in";

const MSG_NOT_FOUND: &str = "Listing does not exist";
const MSG_LOAD_FAILED: &str = "Could not load the listing";
const MSG_NOT_OWNER: &str = "You can not edit that listing";
const MSG_UPLOAD_FAILED: &str = "Something went wrong during uploading images";
const MSG_SAVE_FAILED: &str = "Could not save the listing, please try again";
const MSG_SAVED: &str = "Listing saved successfully";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { listing_id: String },
}

impl FormMode {
    pub fn edit(listing_id: impl Into<String>) -> Self {
        FormMode::Edit {
            listing_id: listing_id.into(),
        }
    }

    pub fn listing_id(&self) -> Option<&str> {
        match self {
            FormMode::Create => None,
            FormMode::Edit { listing_id } => Some(listing_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPhase {
    /// Waiting for the listing and/or the session.
    Loading,
    Ready,
    Submitting,
    /// Navigation happened; the form is no longer shown.
    Redirected,
    /// The owner tore the form down.
    Closed,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("listing `{0}` does not exist")]
    NotFound(String),
    #[error("listing could not be loaded: {0}")]
    LoadFailed(StoreError),
    #[error("listing belongs to `{owner}`, not `{user}`")]
    Unauthorized { owner: String, user: String },
    #[error("no signed-in user")]
    SignedOut,
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upload(#[from] UploadFailure),
    #[error("listing could not be saved: {0}")]
    Persistence(StoreError),
    #[error("form is not ready for that ({0:?})")]
    NotReady(FormPhase),
    #[error("form was closed")]
    Cancelled,
}

/// Collaborators a form needs, built once by the application root.
#[derive(Clone)]
pub struct FormContext {
    pub backend: Backend,
    pub session: Arc<dyn SessionProvider>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub listing_id: String,
    pub redirect: String,
    pub listing: PersistedListing,
}

pub struct ListingForm {
    mode: FormMode,
    ctx: FormContext,
    draft: Arc<ListingDraft>,
    phase: FormPhase,
    session: SessionState,
    listing_owner: Option<String>,
    last_checked: Option<(String, String)>,
}

impl ListingForm {
    pub fn new(mode: FormMode, ctx: FormContext) -> Self {
        let draft = match mode {
            FormMode::Create => ListingDraft::blank(),
            FormMode::Edit { .. } => ListingDraft::default(),
        };
        Self {
            mode,
            ctx,
            draft: Arc::new(draft),
            phase: FormPhase::Loading,
            session: SessionState::Pending,
            listing_owner: None,
            last_checked: None,
        }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    /// True while the form must show a spinner instead of its fields.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, FormPhase::Loading | FormPhase::Submitting)
    }

    /// Current draft snapshot. Later edits produce new snapshots and never
    /// change one already handed out.
    pub fn draft(&self) -> Arc<ListingDraft> {
        self.draft.clone()
    }

    /// Tears the form down. Work still in flight finishes but its results
    /// are discarded.
    pub fn close(&mut self) {
        self.ctx.cancel.cancel();
        self.phase = FormPhase::Closed;
    }

    /// Drives the form to a decision: loads the listing (edit mode) while
    /// following the session, until the form is ready or has redirected.
    pub async fn open(&mut self) -> Result<FormPhase, FormError> {
        let cancel = self.ctx.cancel.clone();
        let mut sessions = self.ctx.session.subscribe();
        let initial = sessions.borrow_and_update().clone();
        self.on_session_changed(initial)?;

        let documents = self.ctx.backend.documents.clone();
        let listing_id = self.mode.listing_id().map(str::to_owned);
        let load = async move {
            match listing_id {
                Some(id) => Some(documents.get_document(LISTINGS, &id).await),
                None => None,
            }
        };
        tokio::pin!(load);
        let mut load_pending = true;
        let mut sessions_open = true;

        while self.phase == FormPhase::Loading && (load_pending || sessions_open) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.phase = FormPhase::Closed;
                    return Err(FormError::Cancelled);
                }
                loaded = &mut load, if load_pending => {
                    load_pending = false;
                    if let Some(result) = loaded {
                        self.on_listing_loaded(result)?;
                    }
                }
                changed = sessions.changed(), if sessions_open => match changed {
                    Ok(()) => {
                        let state = sessions.borrow_and_update().clone();
                        self.on_session_changed(state)?;
                    }
                    Err(_) => sessions_open = false,
                },
            }
        }
        Ok(self.phase)
    }

    /// Applies the result of reading the listing document.
    pub fn on_listing_loaded(
        &mut self,
        result: Result<Option<Document>, StoreError>,
    ) -> Result<(), FormError> {
        self.ensure_live()?;
        let listing_id = self.mode.listing_id().unwrap_or_default().to_string();
        let listing = match result {
            Ok(Some(document)) => serde_json::from_value::<PersistedListing>(Value::Object(document))
                .map_err(|err| StoreError::Deserialize(err.to_string())),
            Ok(None) => {
                warn!(target = "listing_desk.form", listing_id = %listing_id, "listing not found");
                self.leave(HOME_ROUTE, Some(MSG_NOT_FOUND));
                return Err(FormError::NotFound(listing_id));
            }
            Err(err) => Err(err),
        };
        let listing = match listing {
            Ok(listing) => listing,
            Err(err) => {
                warn!(target = "listing_desk.form", listing_id = %listing_id, error = %err, "listing load failed");
                self.leave(HOME_ROUTE, Some(MSG_LOAD_FAILED));
                return Err(FormError::LoadFailed(err));
            }
        };

        debug!(target = "listing_desk.form", listing_id = %listing_id, owner = %listing.user_ref, "listing loaded");
        self.listing_owner = Some(listing.user_ref.clone());
        self.draft = Arc::new(ListingDraft::from_persisted(&listing));
        self.authorize()
    }

    /// Applies a login, logout or the first session resolution.
    pub fn on_session_changed(&mut self, state: SessionState) -> Result<(), FormError> {
        self.ensure_live()?;
        self.session = state.clone();
        match state {
            SessionState::Pending => Ok(()),
            SessionState::SignedOut => {
                self.leave(SIGN_IN_ROUTE, None);
                Err(FormError::SignedOut)
            }
            SessionState::SignedIn(user) => {
                let owner_id = Some(user.id);
                if self.draft.owner_id != owner_id && self.listing_owner.is_none() {
                    self.draft = Arc::new(ListingDraft {
                        owner_id,
                        ..(*self.draft).clone()
                    });
                }
                self.authorize()
            }
        }
    }

    /// Single entry point for every field edit.
    pub fn mutate(&mut self, input: FieldInput) -> Result<Arc<ListingDraft>, FormError> {
        self.ensure_live()?;
        let next = fields::apply(&self.draft, input)?;
        self.draft = Arc::new(next);
        Ok(self.draft.clone())
    }

    pub async fn submit(&mut self) -> Result<SubmitReceipt, FormError> {
        self.ensure_live()?;
        if self.phase != FormPhase::Ready {
            return Err(FormError::NotReady(self.phase));
        }
        let Some(user) = self.ctx.session.current_user() else {
            return Err(FormError::SignedOut);
        };

        let draft = self.draft.clone();
        if let Err(err) = validate::validate(&draft) {
            debug!(target = "listing_desk.form", error = %err, "submission rejected");
            self.ctx.notifier.notify_error(&err.to_string());
            crate::metrics::form_outcome("validation_failed");
            return Err(err.into());
        }

        self.phase = FormPhase::Submitting;
        let uploaded = upload::upload_all(
            self.ctx.backend.objects.clone(),
            &user.id,
            &draft.pending_images,
        )
        .await;
        self.ensure_live()?;
        let img_urls = match uploaded {
            Ok(urls) => urls,
            Err(failure) => {
                self.phase = FormPhase::Ready;
                self.ctx.notifier.notify_error(MSG_UPLOAD_FAILED);
                crate::metrics::form_outcome("upload_failed");
                return Err(failure.into());
            }
        };

        let owner_id = draft.owner_id.clone().unwrap_or_else(|| user.id.clone());
        let record = validate::assemble(&draft, &owner_id, img_urls);
        let (listing_id, written) = self.persist(&record).await;
        self.ensure_live()?;
        if let Err(err) = written {
            warn!(target = "listing_desk.form", listing_id = %listing_id, error = %err, "listing save failed");
            self.phase = FormPhase::Ready;
            self.ctx.notifier.notify_error(MSG_SAVE_FAILED);
            crate::metrics::form_outcome("persistence_failed");
            return Err(FormError::Persistence(err));
        }

        let redirect = format!("/category/{}/{}", record.kind.as_str(), listing_id);
        info!(target = "listing_desk.form", listing_id = %listing_id, images = record.img_urls.len(), "listing saved");
        self.ctx.notifier.notify_success(MSG_SAVED);
        self.ctx.navigator.navigate_to(&redirect);
        self.phase = FormPhase::Redirected;
        crate::metrics::form_outcome("saved");
        Ok(SubmitReceipt {
            listing_id,
            redirect,
            listing: record,
        })
    }

    async fn persist(&self, record: &PersistedListing) -> (String, Result<(), StoreError>) {
        let write = match DocumentWrite::from_record(record) {
            // an edit that withdraws the offer must not leave the old price behind
            Ok(write) => write
                .server_timestamp("timestamp")
                .delete_field("discountedPrice"),
            Err(err) => {
                let id = self.mode.listing_id().unwrap_or_default().to_string();
                return (id, Err(err));
            }
        };
        let documents = &self.ctx.backend.documents;
        match &self.mode {
            FormMode::Create => {
                let id = Uuid::new_v4().to_string();
                let result = documents.set_document(LISTINGS, &id, write).await;
                (id, result)
            }
            FormMode::Edit { listing_id } => {
                let result = documents.update_document(LISTINGS, listing_id, write).await;
                (listing_id.clone(), result)
            }
        }
    }

    // Owner guard. Decides only once both the listing and a signed-in user
    // are known, and only again when either identity changes.
    fn authorize(&mut self) -> Result<(), FormError> {
        let Some(user) = self.session.user().map(|u| u.id.clone()) else {
            return Ok(());
        };
        if self.mode == FormMode::Create {
            self.mark_ready();
            return Ok(());
        }
        let Some(owner) = self.listing_owner.clone() else {
            return Ok(());
        };

        let pair = (owner, user);
        if self.last_checked.as_ref() == Some(&pair) {
            return Ok(());
        }
        self.last_checked = Some(pair.clone());

        let (owner, user) = pair;
        if owner != user {
            warn!(target = "listing_desk.form", owner = %owner, user = %user, "edit attempt by non-owner");
            self.leave(HOME_ROUTE, Some(MSG_NOT_OWNER));
            return Err(FormError::Unauthorized { owner, user });
        }
        self.mark_ready();
        Ok(())
    }

    fn mark_ready(&mut self) {
        if self.phase == FormPhase::Loading {
            self.phase = FormPhase::Ready;
        }
    }

    fn leave(&mut self, route: &str, message: Option<&str>) {
        if let Some(message) = message {
            self.ctx.notifier.notify_error(message);
        }
        self.ctx.navigator.navigate_to(route);
        self.phase = FormPhase::Redirected;
    }

    fn ensure_live(&mut self) -> Result<(), FormError> {
        if self.ctx.cancel.is_cancelled() {
            debug!(target = "listing_desk.form", "form closed; discarding result");
            self.phase = FormPhase::Closed;
            return Err(FormError::Cancelled);
        }
        Ok(())
    }
}
