use thiserror::Error;

use crate::helper::{sanitization_helpers, slug_helpers};

pub const META_TITLE_MAX_CHARS: usize = 60;
pub const META_DESCRIPTION_MAX_CHARS: usize = 160;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title cannot be empty.")]
    EmptyTitle,
    #[error("Meta title is {0} characters long (limit {}).", META_TITLE_MAX_CHARS)]
    MetaTitleTooLong(usize),
    #[error("Meta description is {0} characters long (limit {}).", META_DESCRIPTION_MAX_CHARS)]
    MetaDescriptionTooLong(usize),
    #[error("Slug '{0}' must be lowercase letters, digits and single hyphens.")]
    MalformedSlug(String),
    #[error("Slug '{0}' is already in use.")]
    DuplicateSlug(String),
    #[error("Category name cannot be empty.")]
    EmptyCategoryName,
    #[error("{0} must be plain text without HTML tags.")]
    MarkupInText(&'static str),
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(())
}

pub fn validate_meta_title(meta_title: Option<&str>) -> Result<(), ValidationError> {
    let len = meta_title.map_or(0, |s| s.chars().count());
    if len > META_TITLE_MAX_CHARS {
        return Err(ValidationError::MetaTitleTooLong(len));
    }
    Ok(())
}

pub fn validate_meta_description(meta_description: Option<&str>) -> Result<(), ValidationError> {
    let len = meta_description.map_or(0, |s| s.chars().count());
    if len > META_DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::MetaDescriptionTooLong(len));
    }
    Ok(())
}

/// Text fields are stored exactly as typed, so tags are refused rather than
/// stripped.
pub fn validate_plain_text(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(text) if sanitization_helpers::contains_markup(text) => Err(ValidationError::MarkupInText(field)),
        _ => Ok(()),
    }
}

/// Returns the slug to store: the supplied one when it is well formed, or
/// one derived from `title` when the field was left blank.
pub fn resolve_slug(supplied: &str, title: &str) -> Result<String, ValidationError> {
    let supplied = supplied.trim();
    let slug = if supplied.is_empty() {
        slug_helpers::slugify(title)
    } else {
        supplied.to_string()
    };

    if !slug_helpers::is_valid_slug(&slug) {
        return Err(ValidationError::MalformedSlug(slug));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_is_rejected() {
        assert_eq!(validate_title("   "), Err(ValidationError::EmptyTitle));
        assert!(validate_title("Hello").is_ok());
    }

    #[test]
    fn meta_title_over_sixty_chars_is_rejected() {
        let long = "a".repeat(75);
        assert_eq!(
            validate_meta_title(Some(&long)),
            Err(ValidationError::MetaTitleTooLong(75))
        );
        assert!(validate_meta_title(Some(&"a".repeat(60))).is_ok());
        assert!(validate_meta_title(None).is_ok());
    }

    #[test]
    fn meta_lengths_count_characters_not_bytes() {
        let accented = "é".repeat(60);
        assert!(validate_meta_title(Some(&accented)).is_ok());
        assert!(validate_meta_description(Some(&"ü".repeat(160))).is_ok());
        assert_eq!(
            validate_meta_description(Some(&"ü".repeat(161))),
            Err(ValidationError::MetaDescriptionTooLong(161))
        );
    }

    #[test]
    fn tagged_text_is_refused_and_entities_count_as_typed() {
        assert_eq!(
            validate_plain_text("Title", Some("<em>Fast</em>")),
            Err(ValidationError::MarkupInText("Title"))
        );
        assert!(validate_plain_text("Title", Some("Speed<Safety in F1")).is_ok());
        assert!(validate_plain_text("Excerpt", None).is_ok());
        assert_eq!(
            validate_meta_title(Some(&"&amp;".repeat(15))),
            Err(ValidationError::MetaTitleTooLong(75))
        );
    }

    #[test]
    fn blank_slug_is_derived_from_title() {
        assert_eq!(
            resolve_slug("", "Bugatti Tourbillon: New Era!").as_deref(),
            Ok("bugatti-tourbillon-new-era")
        );
    }

    #[test]
    fn supplied_slug_must_already_be_canonical() {
        assert_eq!(resolve_slug("my-post", "ignored").as_deref(), Ok("my-post"));
        assert_eq!(
            resolve_slug("My Post", "ignored"),
            Err(ValidationError::MalformedSlug("My Post".to_string()))
        );
        assert!(resolve_slug("-edge-", "x").is_err());
    }

    #[test]
    fn title_without_alphanumerics_cannot_yield_a_slug() {
        assert_eq!(
            resolve_slug("", "!!! ???"),
            Err(ValidationError::MalformedSlug(String::new()))
        );
    }
}
