/*!
 * Mock role implementations for testing.
 *
 * This module provides scripted fetchers, translators and exporters that
 * simulate remote behavior without network access:
 * - `MockFetcher` serves a configurable book skeleton and per-episode content
 * - `MockTranslator::working()` always succeeds; other constructors reject
 *   specific content, fail transport for the first N calls, or rate limit
 * - `MockExporter` records what it was asked to export
 *
 * Call counters back the idempotence and retry assertions in the test suite.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::Task;
use crate::book::{Book, EpisodeRef};
use crate::errors::{FetchError, TranslateError};

use super::{
    BatchContext, Exporter, Fetcher, LineOutcome, RoleContext, Translator, TranslatorLimits,
};

/// Scripted fetcher serving an in-memory structure and content table
pub struct MockFetcher {
    name: String,
    /// URL prefix accepted by `can_handle`; `None` accepts everything
    prefix: Option<String>,
    structure: Mutex<Book>,
    /// Episode content keyed by `"<chapter_id>/<episode_id>"`
    content: Mutex<HashMap<String, Vec<String>>>,
    fail_content_for: Mutex<HashSet<String>>,
    structure_calls: AtomicUsize,
    content_calls: AtomicUsize,
}

fn content_key(chapter_id: &str, episode_id: &str) -> String {
    format!("{}/{}", chapter_id, episode_id)
}

impl MockFetcher {
    /// Create a fetcher that serves the given skeleton
    pub fn new<S: Into<String>>(name: S, skeleton: Book) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            structure: Mutex::new(skeleton),
            content: Mutex::new(HashMap::new()),
            fail_content_for: Mutex::new(HashSet::new()),
            structure_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
        }
    }

    /// Restrict `can_handle` to URLs starting with the given prefix
    pub fn handling_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Replace the skeleton served by the next `fetch_structure`
    pub fn set_structure(&self, skeleton: Book) {
        *self.structure.lock() = skeleton;
    }

    /// Script the raw line text of an episode
    pub fn set_content(&self, chapter_id: &str, episode_id: &str, lines: Vec<&str>) {
        self.content.lock().insert(
            content_key(chapter_id, episode_id),
            lines.into_iter().map(String::from).collect(),
        );
    }

    /// Make `fetch_content` fail for one episode
    pub fn fail_content_for(&self, chapter_id: &str, episode_id: &str) {
        self.fail_content_for
            .lock()
            .insert(content_key(chapter_id, episode_id));
    }

    pub fn structure_calls(&self) -> usize {
        self.structure_calls.load(Ordering::SeqCst)
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, url: &str) -> bool {
        match &self.prefix {
            Some(prefix) => url.starts_with(prefix),
            None => true,
        }
    }

    async fn fetch_structure(&self, task: &Task, _ctx: &RoleContext) -> Result<Book, FetchError> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        let mut skeleton = self.structure.lock().clone();
        skeleton.url = task.url.clone();
        Ok(skeleton)
    }

    async fn fetch_content(
        &self,
        episode: &EpisodeRef,
        _ctx: &RoleContext,
    ) -> Result<Vec<String>, FetchError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        let key = content_key(&episode.chapter_id, &episode.episode_id);
        if self.fail_content_for.lock().contains(&key) {
            return Err(FetchError::Unreachable(format!(
                "scripted failure for {}",
                key
            )));
        }
        self.content
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(format!("no scripted content for {}", key)))
    }
}

/// Behavior mode for the mock translator
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds, translating each line deterministically
    Working,
    /// Rejects any line containing the given substring, translates the rest
    RejectContaining(String),
    /// Fails the whole batch with a transport error whenever any line
    /// contains the given substring (isolated only by bisection)
    FailBatchContaining(String),
    /// Fails the first N calls with a transport error, then works
    FailTimes(usize),
    /// Rate limits the first N calls, then works
    RateLimitTimes(usize),
    /// Always fails with a transport error
    Failing,
}

/// Scripted translator with call counters and in-flight tracking
pub struct MockTranslator {
    name: String,
    behavior: MockBehavior,
    limits: TranslatorLimits,
    skip_translated: bool,
    calls: AtomicUsize,
    reminders_seen: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTranslator {
    pub fn new<S: Into<String>>(name: S, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            limits: TranslatorLimits::default(),
            skip_translated: true,
            calls: AtomicUsize::new(0),
            reminders_seen: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a working mock translator that always succeeds
    pub fn working<S: Into<String>>(name: S) -> Self {
        Self::new(name, MockBehavior::Working)
    }

    /// Override the declared limits
    pub fn with_limits(mut self, limits: TranslatorLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Control the `skip_translated` flag
    pub fn with_skip_translated(mut self, skip: bool) -> Self {
        self.skip_translated = skip;
        self
    }

    /// Deterministic translation of one line, prefixed with the role name
    pub fn expected_output(&self, line: &str) -> String {
        format!("{}::{}", self.name, line)
    }

    /// Total `translate_batch` calls, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many calls carried `reminder_due`
    pub fn reminders_seen(&self) -> usize {
        self.reminders_seen.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently in-flight batches observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> TranslatorLimits {
        self.limits
    }

    fn skip_translated(&self) -> bool {
        self.skip_translated
    }

    async fn translate_batch(
        &self,
        lines: &[String],
        batch_ctx: &BatchContext<'_>,
        _ctx: &RoleContext,
    ) -> Result<Vec<LineOutcome>, TranslateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if batch_ctx.reminder_due {
            self.reminders_seen.fetch_add(1, Ordering::SeqCst);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Yield so overlapping batches are actually observed in flight
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.behavior {
            MockBehavior::Working => {}
            MockBehavior::Failing => {
                return Err(TranslateError::Transport("scripted failure".to_string()));
            }
            MockBehavior::FailTimes(n) => {
                if call < *n {
                    return Err(TranslateError::Transport(format!(
                        "scripted failure {} of {}",
                        call + 1,
                        n
                    )));
                }
            }
            MockBehavior::RateLimitTimes(n) => {
                if call < *n {
                    return Err(TranslateError::RateLimited {
                        message: "scripted rate limit".to_string(),
                        retry_after_secs: Some(0),
                    });
                }
            }
            MockBehavior::FailBatchContaining(needle) => {
                if lines.iter().any(|l| l.contains(needle.as_str())) {
                    return Err(TranslateError::Transport(format!(
                        "backend choked on content containing '{}'",
                        needle
                    )));
                }
            }
            MockBehavior::RejectContaining(_) => {}
        }

        Ok(lines
            .iter()
            .map(|line| match &self.behavior {
                MockBehavior::RejectContaining(needle) if line.contains(needle.as_str()) => {
                    LineOutcome::Rejected(format!("content containing '{}' declined", needle))
                }
                _ => LineOutcome::Translated(self.expected_output(line)),
            })
            .collect())
    }
}

/// Exporter that records export calls and optionally fails
pub struct MockExporter {
    name: String,
    fail: bool,
    exported: Mutex<Vec<String>>,
}

impl MockExporter {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fail: false,
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Create an exporter that always fails
    pub fn failing<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fail: true,
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Titles of every book passed to `export`
    pub fn exported_titles(&self) -> Vec<String> {
        self.exported.lock().clone()
    }
}

#[async_trait]
impl Exporter for MockExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(
        &self,
        book: &Book,
        _task: &Task,
        ctx: &RoleContext,
    ) -> anyhow::Result<PathBuf> {
        if self.fail {
            anyhow::bail!("scripted export failure");
        }
        self.exported.lock().push(book.title.clone());
        Ok(ctx.output_dir.join(format!("{}.mock", self.name)))
    }
}
