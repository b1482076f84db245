use crate::backend::DocumentStore;
use crate::models::{Landlord, USERS};
use crate::shell::Notifier;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use urlencoding::encode;

const MSG_NO_LANDLORD: &str = "Sorry, could not get landlord information";

/// Loads a landlord's public profile so a visitor can write to them about a
/// listing.
pub struct LandlordContact {
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
}

impl LandlordContact {
    pub fn new(documents: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            documents,
            notifier,
        }
    }

    /// `None` means nothing should be rendered; the user has been told why.
    pub async fn load(&self, landlord_id: &str) -> Option<Landlord> {
        let landlord = match self.documents.get_document(USERS, landlord_id).await {
            Ok(Some(document)) => serde_json::from_value::<Landlord>(Value::Object(document))
                .map_err(|err| err.to_string()),
            Ok(None) => Err("not found".to_string()),
            Err(err) => Err(err.to_string()),
        };
        match landlord {
            Ok(landlord) => Some(landlord),
            Err(reason) => {
                warn!(target = "listing_desk.contact", landlord_id, reason = %reason, "landlord lookup failed");
                self.notifier.notify_error(MSG_NO_LANDLORD);
                None
            }
        }
    }
}

/// `mailto:` link with the listing name as subject and the message as body.
pub fn mailto(landlord: &Landlord, listing_name: &str, message: &str) -> String {
    format!(
        "mailto:{}?Subject={}&body={}",
        landlord.email,
        encode(listing_name),
        encode(message)
    )
}
