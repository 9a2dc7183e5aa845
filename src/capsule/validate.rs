//! Pure validation for timeline item input
//!
//! Messages are treated as plain text: script blocks are removed with their
//! content and any remaining markup tags are stripped before the length
//! checks run. Attachment references are either HTTPS URLs or
//! `<capsuleId>/<blobId>` pairs owned by the current capsule.

use super::item::{CapsuleId, NewItem};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Maximum message length in characters, after sanitization and trimming
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Maximum number of attachment references per item
pub const MAX_ATTACHMENTS: usize = 5;

/// Maximum length of a single attachment reference
pub const MAX_ATTACHMENT_LENGTH: usize = 2048;

/// Validation errors: always caller-fault, never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is required")]
    EmptyMessage,

    #[error("message exceeds {MAX_MESSAGE_LENGTH} characters")]
    MessageTooLong,

    #[error("invalid openingDate format: {0}")]
    InvalidOpeningDate(String),

    #[error("too many attachments (max {MAX_ATTACHMENTS})")]
    TooManyAttachments,

    #[error("attachment reference too long")]
    AttachmentTooLong,

    #[error("invalid attachment reference: {0}")]
    InvalidAttachment(String),

    #[error("attachment belongs to another capsule: {0}")]
    ForeignAttachment(String),

    #[error("invalid capsule id format")]
    InvalidCapsuleId,

    #[error("invalid item id format")]
    InvalidItemId,
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("script regex is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex is valid"))
}

/// Strip script blocks (including their content) and all remaining markup
/// tags. No markup is trusted or preserved.
pub fn sanitize_message(raw: &str) -> String {
    let without_scripts = script_re().replace_all(raw, "");
    tag_re().replace_all(&without_scripts, "").into_owned()
}

/// Sanitize and length-check a message, returning the cleaned text.
pub fn validate_message(raw: &str) -> Result<String, ValidationError> {
    let cleaned = sanitize_message(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::MessageTooLong);
    }
    Ok(trimmed.to_string())
}

/// Check that a date is `YYYY-MM-DD` and a real calendar date.
pub fn validate_opening_date(date: &str) -> Result<(), ValidationError> {
    if !date_re().is_match(date) {
        return Err(ValidationError::InvalidOpeningDate(date.to_string()));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidOpeningDate(date.to_string()))?;
    Ok(())
}

/// Check one attachment reference against the owning capsule.
///
/// Accepted forms: an HTTPS URL, or `<uuid>/<uuid>` where the first uuid
/// equals `capsule` (case-insensitive). Cross-capsule references are
/// rejected.
pub fn validate_attachment(capsule: &CapsuleId, reference: &str) -> Result<(), ValidationError> {
    if reference.chars().count() > MAX_ATTACHMENT_LENGTH {
        return Err(ValidationError::AttachmentTooLong);
    }
    if let Ok(url) = reqwest::Url::parse(reference) {
        if url.scheme() == "https" {
            return Ok(());
        }
        return Err(ValidationError::InvalidAttachment(reference.to_string()));
    }
    let Some((owner, blob)) = reference.split_once('/') else {
        return Err(ValidationError::InvalidAttachment(reference.to_string()));
    };
    let owner =
        Uuid::parse_str(owner).map_err(|_| ValidationError::InvalidAttachment(reference.to_string()))?;
    Uuid::parse_str(blob).map_err(|_| ValidationError::InvalidAttachment(reference.to_string()))?;
    if owner != *capsule.as_uuid() {
        return Err(ValidationError::ForeignAttachment(reference.to_string()));
    }
    Ok(())
}

/// Check an attachment list: count bound plus every reference.
pub fn validate_attachments(
    capsule: &CapsuleId,
    references: &[String],
) -> Result<(), ValidationError> {
    if references.len() > MAX_ATTACHMENTS {
        return Err(ValidationError::TooManyAttachments);
    }
    for reference in references {
        validate_attachment(capsule, reference)?;
    }
    Ok(())
}

/// Parse a capsule id supplied by the router.
pub fn parse_capsule_id(raw: &str) -> Result<CapsuleId, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidCapsuleId)
}

/// Parse an item id supplied by the router. No validation happens beyond
/// well-formedness; an unknown id is a not-found, not a validation error.
pub fn parse_item_id(raw: &str) -> Result<super::item::ItemId, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidItemId)
}

/// Validate a full `NewItem`, returning the sanitized message text.
///
/// Fails without any side effects; nothing is persisted on error.
pub fn validate_new_item(capsule: &CapsuleId, input: &NewItem) -> Result<String, ValidationError> {
    let message = validate_message(&input.message)?;
    if let Some(date) = &input.opening_date {
        validate_opening_date(date)?;
    }
    if let Some(references) = &input.attachments {
        validate_attachments(capsule, references)?;
    }
    Ok(message)
}
