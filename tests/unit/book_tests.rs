/*!
 * Unit tests for the document tree and its change fingerprints
 */

use bookforge::book::{Book, Chapter, Episode, EpisodeRef, Line, content_fingerprint};

use crate::common;

#[test]
fn test_contentFingerprint_shouldBeStableAndHex() {
    let a = content_fingerprint("こんにちは");
    let b = content_fingerprint("こんにちは");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, content_fingerprint("こんばんは"));
}

#[test]
fn test_setContent_sameText_shouldKeepTranslation() {
    let mut line = Line::new("original");
    line.set_translated("t1", "translated");

    assert!(!line.set_content("original"));
    assert_eq!(line.translated.as_deref(), Some("translated"));
    assert_eq!(line.candidates.len(), 1);
}

#[test]
fn test_setContent_changedText_shouldInvalidateTranslationAndCandidates() {
    let mut line = Line::new("original");
    line.set_translated("t1", "translated");
    line.set_translated("t2", "also translated");

    assert!(line.set_content("rewritten"));
    assert!(line.translated.is_none());
    assert!(line.candidates.is_empty());
    assert_eq!(line.content(), "rewritten");
}

#[test]
fn test_setTranslated_shouldKeepAllCandidates() {
    let mut line = Line::new("source");
    line.set_translated("first", "first output");
    line.set_translated("second", "second output");

    assert_eq!(line.translated.as_deref(), Some("second output"));
    assert_eq!(line.candidates["first"], "first output");
    assert_eq!(line.candidates["second"], "second output");
}

#[test]
fn test_blankLines_shouldNotCountTowardsFullyTranslated() {
    let mut episode = Episode::new("e1", "First");
    episode.lines = vec![Line::new("text"), Line::new("   "), Line::new("")];
    episode.lines[0].set_translated("t", "done");

    assert!(episode.lines[1].is_blank());
    assert!(episode.fully_translated());
}

#[test]
fn test_resolve_shouldFindEpisodeByStableIds() {
    let book = common::sample_skeleton();
    let chapter = book.chapter("c1").unwrap();
    let episode = chapter.episode("e2").unwrap();
    let episode_ref = EpisodeRef::new(&book, chapter, episode);

    assert_eq!(book.resolve(&episode_ref).unwrap().id, "e2");
    assert_eq!(
        episode_ref.to_string(),
        format!("{}/c1/e2", common::BOOK_URL)
    );
}

#[test]
fn test_toHtml_shouldPreferTranslatedText() {
    let mut book = Book::new("原題", "Author", common::BOOK_URL);
    book.title_translated = Some("Translated Title".to_string());
    let mut chapter = Chapter::new("c1", "第一章");
    let mut episode = Episode::new("e1", "第一話");
    let mut line = Line::new("原文");
    line.set_translated("t", "translated line");
    episode.lines.push(line);
    episode.lines.push(Line::new("untranslated source"));
    chapter.episodes.push(episode);
    book.chapters.push(chapter);

    let html = book.to_html();
    assert!(html.contains("Translated Title"));
    assert!(html.contains("translated line"));
    // Untranslated nodes fall back to their source text
    assert!(html.contains("untranslated source"));
}

#[test]
fn test_bookSerde_shouldPreservePrivateFingerprints() {
    let mut book = common::sample_skeleton();
    book.chapters[0].episodes[0].lines = vec![Line::new("a"), Line::new("b")];
    book.chapters[0].episodes[0].lines[0].set_translated("t", "done");

    let json = serde_json::to_string(&book).unwrap();
    let back: Book = serde_json::from_str(&json).unwrap();
    assert_eq!(back, book);
    assert_eq!(
        back.chapters[0].episodes[0].lines[0].fingerprint(),
        book.chapters[0].episodes[0].lines[0].fingerprint()
    );
}
