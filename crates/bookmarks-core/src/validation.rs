//! Client-side input validation
//!
//! Runs before any backend call. A rejected draft never reaches the
//! persistence layer.

use reqwest::Url;
use thiserror::Error;

use crate::models::NewBookmark;

/// Reasons a bookmark draft is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title is required")]
    MissingTitle,

    #[error("Please enter a valid URL")]
    InvalidUrl { url: String },
}

impl ValidationError {
    /// Inline message shown next to the form
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationError::MissingTitle => "Title is required",
            ValidationError::InvalidUrl { .. } => "Please enter a valid URL",
        }
    }
}

/// Check that a URL is syntactically valid and absolute
pub fn validate_url(url: &str) -> Result<Url, ValidationError> {
    Url::parse(url.trim()).map_err(|_| ValidationError::InvalidUrl {
        url: url.to_string(),
    })
}

/// Validate a title and URL and build the insert payload
///
/// Surrounding whitespace is trimmed from both fields.
pub fn validate_new_bookmark(
    user_id: &str,
    title: &str,
    url: &str,
) -> Result<NewBookmark, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::MissingTitle);
    }

    validate_url(url)?;

    Ok(NewBookmark::new(user_id, title, url.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bookmark() {
        let draft = validate_new_bookmark("user-1", "  Rust  ", " https://rust-lang.org ").unwrap();
        assert_eq!(draft.title, "Rust");
        assert_eq!(draft.url, "https://rust-lang.org");
        assert_eq!(draft.user_id, "user-1");
    }

    #[test]
    fn test_missing_title() {
        let err = validate_new_bookmark("user-1", "   ", "https://example.com").unwrap_err();
        assert_eq!(err, ValidationError::MissingTitle);
    }

    #[test]
    fn test_malformed_url() {
        let err = validate_new_bookmark("user-1", "Nope", "not-a-url").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl { .. }));
        assert_eq!(err.user_message(), "Please enter a valid URL");
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(validate_url("/just/a/path").is_err());
        assert!(validate_url("example.com").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_absolute_urls_accepted() {
        assert!(validate_url("https://example.com/a?b=c#d").is_ok());
        assert!(validate_url("http://localhost:3000").is_ok());
        assert!(validate_url("ftp://files.example.com/readme").is_ok());
    }
}
