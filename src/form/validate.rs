use crate::models::{GeoPoint, ListingDraft, MAX_IMAGES, PersistedListing};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const NAME_LENGTH: RangeInclusive<usize> = 10..=50;
pub const BEDROOMS: RangeInclusive<u32> = 1..=15;
pub const BATHROOMS: RangeInclusive<u32> = 1..=10;
pub const PRICE: RangeInclusive<u64> = 1_000..=100_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must be between 10 and 50 characters")]
    NameLength,
    #[error("Bedrooms must be between 1 and 15")]
    Bedrooms,
    #[error("Bathrooms must be between 1 and 10")]
    Bathrooms,
    #[error("Address is required")]
    Address,
    #[error("Please answer `{0}`")]
    Unanswered(&'static str),
    #[error("Regular price must be between 1000 and 100000000")]
    RegularPrice,
    #[error("Discounted price must be between 1000 and 100000000")]
    DiscountedPrice,
    #[error("At least one image is required")]
    NoImages,
    #[error("Discounted price needs to be lesser than the regular price")]
    DiscountNotLower,
    #[error("Maximum 5 images are allowed")]
    TooManyImages,
}

/// Runs every pre-submit check, stopping at the first failure. Nothing here
/// touches the network.
pub fn validate(draft: &ListingDraft) -> Result<(), ValidationError> {
    check_inputs(draft)?;

    if draft.offer.is_yes() && draft.discounted_price >= draft.regular_price {
        return Err(ValidationError::DiscountNotLower);
    }
    if draft.pending_images.len() > MAX_IMAGES {
        return Err(ValidationError::TooManyImages);
    }
    Ok(())
}

// Constraints the form inputs themselves declare.
fn check_inputs(draft: &ListingDraft) -> Result<(), ValidationError> {
    if !NAME_LENGTH.contains(&draft.name.trim().chars().count()) {
        return Err(ValidationError::NameLength);
    }
    if !BEDROOMS.contains(&draft.bedrooms) {
        return Err(ValidationError::Bedrooms);
    }
    if !BATHROOMS.contains(&draft.bathrooms) {
        return Err(ValidationError::Bathrooms);
    }
    for (label, flag) in [
        ("parking", draft.parking),
        ("furnished", draft.furnished),
        ("offer", draft.offer),
    ] {
        if !flag.is_set() {
            return Err(ValidationError::Unanswered(label));
        }
    }
    if draft.address.trim().is_empty() {
        return Err(ValidationError::Address);
    }
    if !PRICE.contains(&draft.regular_price) {
        return Err(ValidationError::RegularPrice);
    }
    if draft.offer.is_yes() && !PRICE.contains(&draft.discounted_price) {
        return Err(ValidationError::DiscountedPrice);
    }
    if draft.pending_images.is_empty() {
        return Err(ValidationError::NoImages);
    }
    Ok(())
}

/// Builds the stored record from a validated draft and the uploaded image
/// URLs. `discountedPrice` is only written while an offer is active.
pub fn assemble(draft: &ListingDraft, owner_id: &str, img_urls: Vec<String>) -> PersistedListing {
    let offer = draft.offer.is_yes();
    PersistedListing {
        kind: draft.kind,
        name: draft.name.trim().to_string(),
        bedrooms: draft.bedrooms,
        bathrooms: draft.bathrooms,
        parking: draft.parking.is_yes(),
        furnished: draft.furnished.is_yes(),
        offer,
        regular_price: draft.regular_price,
        discounted_price: offer.then_some(draft.discounted_price),
        location: draft.address.clone(),
        geolocation: GeoPoint {
            lat: draft.latitude,
            lng: draft.longitude,
        },
        img_urls,
        user_ref: owner_id.to_string(),
        timestamp: None,
    }
}
