use crate::models::{ListingDraft, ListingKind, PendingImage};
use std::str::FromStr;
use thiserror::Error;

/// One edit coming from the form.
#[derive(Debug, Clone)]
pub enum FieldInput {
    /// A new file selection. Replaces the previous one entirely.
    Files(Vec<PendingImage>),
    Value { id: String, value: String },
}

impl FieldInput {
    pub fn value(id: impl Into<String>, value: impl Into<String>) -> Self {
        FieldInput::Value {
            id: id.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("unknown field `{0}`")]
    Unknown(String),
    #[error("`{value}` is not a valid value for `{field}` (expected {expected})")]
    Invalid {
        field: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coerced {
    Bool(bool),
    Raw(String),
}

impl Coerced {
    fn into_text(self) -> String {
        match self {
            Coerced::Bool(value) => value.to_string(),
            Coerced::Raw(value) => value,
        }
    }
}

/// Literal `"true"`/`"false"` become booleans; anything else is left as typed.
pub fn coerce(raw: &str) -> Coerced {
    match raw {
        "true" => Coerced::Bool(true),
        "false" => Coerced::Bool(false),
        other => Coerced::Raw(other.to_string()),
    }
}

/// Applies one edit and returns the next snapshot. `draft` is never touched,
/// so a rejected edit leaves the current snapshot as it was.
pub fn apply(draft: &ListingDraft, input: FieldInput) -> Result<ListingDraft, FieldError> {
    let mut next = draft.clone();
    let (id, value) = match input {
        FieldInput::Files(files) => {
            next.pending_images = files;
            return Ok(next);
        }
        FieldInput::Value { id, value } => (id, coerce(&value)),
    };

    match id.as_str() {
        "type" => {
            let raw = value.into_text();
            next.kind = raw
                .parse::<ListingKind>()
                .map_err(|_| invalid(&id, &raw, "sale or rent"))?;
        }
        "name" => next.name = value.into_text(),
        "address" => next.address = value.into_text(),
        "bedrooms" => next.bedrooms = number(&id, value)?,
        "bathrooms" => next.bathrooms = number(&id, value)?,
        "regularPrice" => next.regular_price = number(&id, value)?,
        "discountedPrice" => next.discounted_price = number(&id, value)?,
        "latitude" => next.latitude = coordinate(&id, value)?,
        "longitude" => next.longitude = coordinate(&id, value)?,
        "parking" => next.parking = toggle(&id, value)?.into(),
        "furnished" => next.furnished = toggle(&id, value)?.into(),
        "offer" => next.offer = toggle(&id, value)?.into(),
        other => return Err(FieldError::Unknown(other.to_string())),
    }
    Ok(next)
}

fn invalid(field: &str, value: &str, expected: &'static str) -> FieldError {
    FieldError::Invalid {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn number<T: FromStr>(field: &str, value: Coerced) -> Result<T, FieldError> {
    let raw = value.into_text();
    raw.trim()
        .parse::<T>()
        .map_err(|_| invalid(field, &raw, "a whole number"))
}

fn coordinate(field: &str, value: Coerced) -> Result<f64, FieldError> {
    let raw = value.into_text();
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(field, &raw, "a number"))
}

fn toggle(field: &str, value: Coerced) -> Result<bool, FieldError> {
    match value {
        Coerced::Bool(flag) => Ok(flag),
        Coerced::Raw(raw) => Err(invalid(field, &raw, "true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Flag;
    use bytes::Bytes;

    fn image(name: &str) -> PendingImage {
        PendingImage::new(name, "image/jpeg", Bytes::from_static(b"img"))
    }

    #[test]
    fn boolean_literals_are_coerced() {
        assert_eq!(coerce("true"), Coerced::Bool(true));
        assert_eq!(coerce("false"), Coerced::Bool(false));
        assert_eq!(coerce("True"), Coerced::Raw("True".into()));
        assert_eq!(coerce("12"), Coerced::Raw("12".into()));
    }

    #[test]
    fn toggles_and_numbers_update_the_draft() {
        let draft = ListingDraft::default();
        let next = apply(&draft, FieldInput::value("offer", "true")).unwrap();
        let next = apply(&next, FieldInput::value("bedrooms", "3")).unwrap();
        let next = apply(&next, FieldInput::value("latitude", "-33.86")).unwrap();
        let next = apply(&next, FieldInput::value("type", "sale")).unwrap();

        assert_eq!(next.offer, Flag::Yes);
        assert_eq!(next.bedrooms, 3);
        assert_eq!(next.latitude, -33.86);
        assert_eq!(next.kind, ListingKind::Sale);
        // the input snapshot is left alone
        assert_eq!(draft.offer, Flag::Unset);
        assert_eq!(draft.bedrooms, 1);
    }

    #[test]
    fn text_fields_keep_boolean_looking_text() {
        let next = apply(&ListingDraft::default(), FieldInput::value("name", "true")).unwrap();
        assert_eq!(next.name, "true");
    }

    #[test]
    fn file_selection_replaces_previous_selection() {
        let draft = apply(
            &ListingDraft::default(),
            FieldInput::Files(vec![image("a.jpg"), image("b.jpg")]),
        )
        .unwrap();
        let next = apply(&draft, FieldInput::Files(vec![image("c.jpg")])).unwrap();
        let names: Vec<_> = next.pending_images.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, ["c.jpg"]);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let draft = ListingDraft::default();
        assert_eq!(
            apply(&draft, FieldInput::value("pool", "yes")).unwrap_err(),
            FieldError::Unknown("pool".into())
        );
        assert!(matches!(
            apply(&draft, FieldInput::value("regularPrice", "")).unwrap_err(),
            FieldError::Invalid { .. }
        ));
        assert!(matches!(
            apply(&draft, FieldInput::value("parking", "maybe")).unwrap_err(),
            FieldError::Invalid { .. }
        ));
        assert!(matches!(
            apply(&draft, FieldInput::value("longitude", "NaN")).unwrap_err(),
            FieldError::Invalid { .. }
        ));
    }
}
