use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::str::FromStr;
use thiserror::Error;

pub const LISTINGS: &str = "listings";
pub const USERS: &str = "users";
pub const MAX_IMAGES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Sale,
    #[default]
    Rent,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Sale => "sale",
            ListingKind::Rent => "rent",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown listing type `{0}`")]
pub struct UnknownListingKind(pub String);

impl FromStr for ListingKind {
    type Err = UnknownListingKind;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "sale" | "sell" => Ok(ListingKind::Sale),
            "rent" => Ok(ListingKind::Rent),
            _ => Err(UnknownListingKind(input.to_string())),
        }
    }
}

/// Yes/no toggle that has not been answered yet while the form first renders.
///
/// Serialized as `null`, `true` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Flag {
    #[default]
    Unset,
    Yes,
    No,
}

impl Flag {
    pub fn is_yes(self) -> bool {
        self == Flag::Yes
    }

    pub fn is_set(self) -> bool {
        self != Flag::Unset
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value { Flag::Yes } else { Flag::No }
    }
}

impl From<Option<bool>> for Flag {
    fn from(value: Option<bool>) -> Self {
        value.map(Flag::from).unwrap_or(Flag::Unset)
    }
}

impl From<Flag> for Option<bool> {
    fn from(value: Flag) -> Self {
        match value {
            Flag::Unset => None,
            Flag::Yes => Some(true),
            Flag::No => Some(false),
        }
    }
}

/// A file picked in the form but not uploaded yet.
#[derive(Debug, Clone, Serialize)]
pub struct PendingImage {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl PendingImage {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            size: bytes.len(),
            bytes,
        }
    }
}

/// In-progress state of the listing form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub name: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: Flag,
    pub furnished: Flag,
    pub offer: Flag,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub regular_price: u64,
    pub discounted_price: u64,
    pub pending_images: Vec<PendingImage>,
    pub owner_id: Option<String>,
}

impl Default for ListingDraft {
    fn default() -> Self {
        Self {
            kind: ListingKind::Rent,
            name: String::new(),
            bedrooms: 1,
            bathrooms: 1,
            parking: Flag::Unset,
            furnished: Flag::Unset,
            offer: Flag::Unset,
            address: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            regular_price: 0,
            discounted_price: 0,
            pending_images: Vec::new(),
            owner_id: None,
        }
    }
}

impl ListingDraft {
    /// Starting point for a brand new listing: every toggle answered "no".
    pub fn blank() -> Self {
        Self {
            parking: Flag::No,
            furnished: Flag::No,
            offer: Flag::No,
            ..Self::default()
        }
    }

    pub fn from_persisted(listing: &PersistedListing) -> Self {
        Self {
            kind: listing.kind,
            name: listing.name.clone(),
            bedrooms: listing.bedrooms,
            bathrooms: listing.bathrooms,
            parking: listing.parking.into(),
            furnished: listing.furnished.into(),
            offer: listing.offer.into(),
            address: listing.location.clone(),
            latitude: listing.geolocation.lat,
            longitude: listing.geolocation.lng,
            regular_price: listing.regular_price,
            discounted_price: listing.discounted_price.unwrap_or_default(),
            pending_images: Vec::new(),
            owner_id: Some(listing.user_ref.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A listing document as stored in the `listings` collection.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedListing {
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub name: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: bool,
    pub furnished: bool,
    pub offer: bool,
    pub regular_price: u64,
    #[serde(default)]
    pub discounted_price: Option<u64>,
    pub location: String,
    pub geolocation: GeoPoint,
    #[serde(default)]
    pub img_urls: Vec<String>,
    pub user_ref: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Public profile of a listing owner, read from the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Landlord {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<crate::shell::Notice>,
}
