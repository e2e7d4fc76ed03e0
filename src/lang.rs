use anyhow::{Result, anyhow};
use isolang::Language;

/// Language tag utilities for task source/target languages
///
/// Tasks carry ISO 639-1 (2-letter) or ISO 639-2/T (3-letter) language tags.
/// Translation backends usually want a human-readable language name in their
/// prompt context, so this module maps tags to English names and validates
/// tags at config-load time.
/// Validate a task language tag
pub fn validate_language_tag(tag: &str) -> Result<()> {
    let normalized = tag.trim().to_lowercase();

    if normalized.len() == 2 && Language::from_639_1(&normalized).is_some() {
        return Ok(());
    }
    if normalized.len() == 3 && Language::from_639_3(&normalized).is_some() {
        return Ok(());
    }

    Err(anyhow!("Invalid language tag: {}", tag))
}

/// Map a language tag to its English language name.
///
/// Falls back to the tag itself for anything isolang does not know, so a
/// backend prompt still gets something usable rather than an error.
pub fn language_name(tag: &str) -> String {
    let normalized = tag.trim().to_lowercase();

    let lang = if normalized.len() == 2 {
        Language::from_639_1(&normalized)
    } else {
        Language::from_639_3(&normalized)
    };

    match lang {
        Some(lang) => lang.to_name().to_string(),
        None => tag.to_string(),
    }
}

/// Check whether two language tags name the same language
pub fn language_tags_match(tag1: &str, tag2: &str) -> bool {
    let normalize = |tag: &str| -> Option<Language> {
        let tag = tag.trim().to_lowercase();
        if tag.len() == 2 {
            Language::from_639_1(&tag)
        } else {
            Language::from_639_3(&tag)
        }
    };

    match (normalize(tag1), normalize(tag2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
