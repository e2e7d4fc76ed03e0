/*!
 * Unit tests for language tag utilities
 */

use bookforge::lang::{language_name, language_tags_match, validate_language_tag};

#[test]
fn test_validateLanguageTag_shouldAcceptBothIsoForms() {
    assert!(validate_language_tag("ja").is_ok());
    assert!(validate_language_tag("jpn").is_ok());
    assert!(validate_language_tag("EN").is_ok());
    assert!(validate_language_tag(" en ").is_ok());
}

#[test]
fn test_validateLanguageTag_shouldRejectUnknownTags() {
    assert!(validate_language_tag("xx").is_err());
    assert!(validate_language_tag("").is_err());
    assert!(validate_language_tag("english").is_err());
}

#[test]
fn test_languageName_shouldResolveKnownTags() {
    assert_eq!(language_name("ja"), "Japanese");
    assert_eq!(language_name("en"), "English");
    // Unknown tags fall back to the tag itself
    assert_eq!(language_name("zz"), "zz");
}

#[test]
fn test_languageTagsMatch_shouldBridgeIsoForms() {
    assert!(language_tags_match("ja", "jpn"));
    assert!(language_tags_match("en", "EN"));
    assert!(!language_tags_match("ja", "en"));
}
