/*!
 * Common test utilities for the bookforge test suite
 */

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use bookforge::app_config::{Config, Task};
use bookforge::book::{Book, Chapter, Episode};
use bookforge::roles::mock::MockFetcher;
use bookforge::roles::{Role, RoleContext, RoleRegistry};
use bookforge::store::BookStore;

pub const BOOK_URL: &str = "https://mock.example/novel/1";

/// Route log output through env_logger for tests that want RUST_LOG
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// A two-episode book skeleton, chapters and episodes only
pub fn sample_skeleton() -> Book {
    let mut book = Book::new("Sample Book", "Author", BOOK_URL);
    let mut chapter = Chapter::new("c1", "Chapter One");
    chapter.episodes.push(Episode::new("e1", "First"));
    chapter.episodes.push(Episode::new("e2", "Second"));
    book.chapters.push(chapter);
    book
}

/// A scripted fetcher serving the sample skeleton with content for both
/// episodes
pub fn sample_fetcher() -> Arc<MockFetcher> {
    let fetcher = Arc::new(MockFetcher::new("mock-fetcher", sample_skeleton()));
    fetcher.set_content("c1", "e1", vec!["line one", "line two"]);
    fetcher.set_content("c1", "e2", vec!["line three"]);
    fetcher
}

/// A task bound to the sample book, with the given role chains
pub fn sample_task(translators: &[&str], exporters: &[&str]) -> Task {
    Task {
        url: BOOK_URL.to_string(),
        friendly_name: "sample".to_string(),
        translators: translators.iter().map(|s| s.to_string()).collect(),
        exporters: exporters.iter().map(|s| s.to_string()).collect(),
        ..Task::default()
    }
}

/// A registry holding the given roles; panics on duplicate names
pub fn registry_of(roles: Vec<Role>) -> Arc<RoleRegistry> {
    let mut registry = RoleRegistry::new();
    for role in roles {
        registry.register(role).expect("duplicate role in test setup");
    }
    Arc::new(registry)
}

/// A config wrapping one task with default backend settings
pub fn config_for(task: &Task) -> Arc<Config> {
    Arc::new(Config {
        tasks: vec![task.clone()],
        ..Config::default()
    })
}

/// An immediate-flush store in a fresh subdirectory of `dir`
pub fn open_store(dir: &TempDir) -> Result<BookStore> {
    Ok(BookStore::open(dir.path().join("store"), 0)?)
}

/// A role context writing artifacts under `dir`
pub fn role_ctx(dir: &TempDir) -> RoleContext {
    RoleContext::new(reqwest::Client::new(), dir.path().join("out"))
}
