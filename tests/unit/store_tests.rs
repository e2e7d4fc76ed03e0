/*!
 * Unit tests for the persistent book store
 */

use bookforge::book::Line;
use bookforge::errors::StoreError;
use bookforge::store::BookStore;

use crate::common;

#[test]
fn test_upsertAndLoad_shouldRoundTripThroughDisk() {
    let dir = common::create_temp_dir().unwrap();
    let mut book = common::sample_skeleton();
    book.chapters[0].episodes[0].lines = vec![Line::new("a")];

    {
        let store = BookStore::open(dir.path(), 0).unwrap();
        store.upsert(book.clone()).unwrap();
        assert!(store.document_path(common::BOOK_URL).exists());
    }

    // A fresh store instance reads the document back from disk
    let store = BookStore::open(dir.path(), 0).unwrap();
    let loaded = store.load(common::BOOK_URL).unwrap().unwrap();
    assert_eq!(loaded.title, book.title);
    assert_eq!(loaded.chapters[0].episodes[0].lines[0].content(), "a");
    // Persisting stamps the save time
    assert!(loaded.time_meta.saved_at.is_some());
}

#[test]
fn test_load_unknownUrl_shouldReturnNone() {
    let dir = common::create_temp_dir().unwrap();
    let store = BookStore::open(dir.path(), 0).unwrap();
    assert!(store.load("https://mock.example/absent").unwrap().is_none());
}

#[test]
fn test_bufferedWrites_shouldOnlyHitDiskOnFlush() {
    let dir = common::create_temp_dir().unwrap();
    let store = BookStore::open(dir.path(), 100).unwrap();
    let book = common::sample_skeleton();

    store.upsert(book.clone()).unwrap();
    assert_eq!(store.pending_writes(), 1);
    assert!(!store.document_path(common::BOOK_URL).exists());
    // Reads see the buffered copy before any flush
    assert!(store.load(common::BOOK_URL).unwrap().is_some());

    store.flush().unwrap();
    assert_eq!(store.pending_writes(), 0);
    assert!(store.document_path(common::BOOK_URL).exists());
}

#[test]
fn test_flush_shouldBeIdempotent() {
    let dir = common::create_temp_dir().unwrap();
    let store = BookStore::open(dir.path(), 100).unwrap();
    store.upsert(common::sample_skeleton()).unwrap();
    store.flush().unwrap();
    let modified = std::fs::metadata(store.document_path(common::BOOK_URL))
        .unwrap()
        .modified()
        .unwrap();

    store.flush().unwrap();
    let modified_again = std::fs::metadata(store.document_path(common::BOOK_URL))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(modified, modified_again);
}

#[test]
fn test_corruptDocument_shouldSurfaceNotRepair() {
    let dir = common::create_temp_dir().unwrap();
    let path;
    {
        let store = BookStore::open(dir.path(), 0).unwrap();
        store.upsert(common::sample_skeleton()).unwrap();
        path = store.document_path(common::BOOK_URL);
    }
    std::fs::write(&path, "{ not json").unwrap();

    let store = BookStore::open(dir.path(), 0).unwrap();
    let err = store.load(common::BOOK_URL).unwrap_err();
    assert!(matches!(err, StoreError::Corruption { .. }));
    // The broken file is left in place for inspection
    assert!(path.exists());
}

#[test]
fn test_queryUntranslated_shouldListOnlyPendingLines() {
    let dir = common::create_temp_dir().unwrap();
    let store = BookStore::open(dir.path(), 0).unwrap();
    let mut book = common::sample_skeleton();
    book.chapters[0].episodes[0].lines =
        vec![Line::new("a"), Line::new("b"), Line::new("  ")];
    book.chapters[0].episodes[0].lines[0].set_translated("t", "done");
    store.upsert(book).unwrap();

    let pending = store.query_untranslated(common::BOOK_URL).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].index, 1);
}

#[test]
fn test_documentPath_shouldIsolateDifferentUrls() {
    let dir = common::create_temp_dir().unwrap();
    let store = BookStore::open(dir.path(), 0).unwrap();
    let a = store.document_path("https://mock.example/novel/1");
    let b = store.document_path("https://mock.example/novel/2");
    assert_ne!(a, b);
    assert_eq!(a, store.document_path("https://mock.example/novel/1"));
}
