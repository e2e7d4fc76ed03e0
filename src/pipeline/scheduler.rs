/*!
 * Drives pending lines through one translator role.
 *
 * Consecutive pending lines within an episode are grouped into batches up to
 * the backend's declared character budget. A batch fails as a unit on
 * transport errors: it is retried with exponential backoff up to the
 * configured cap, then bisected into halves to isolate the offending content.
 * A single-line batch that still fails is marked failed and the scheduler
 * moves on; one bad line never blocks its episode.
 *
 * Retry and bisection run as an explicit work queue with bounded per-batch
 * attempt counters, so deeply failing batches cannot grow the call stack.
 */

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::app_config::{BackendSettings, Task};
use crate::book::{Book, Episode};
use crate::errors::TranslateError;
use crate::roles::{BatchContext, LineOutcome, RoleContext, Translator};

/// Progress callback invoked after each batch settles, with
/// (settled_batches, known_total_batches)
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Tuning knobs for one scheduler run, taken from the backend settings of
/// the translator role
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Transport-failure retries per batch before bisection
    pub max_retries: u32,
    /// Base backoff, doubled per attempt with jitter
    pub retry_backoff_ms: u64,
    /// Per-call timeout; an elapsed timeout counts as one retry attempt
    pub timeout_secs: u64,
    /// Every Nth dispatched batch carries the full glossary reminder;
    /// zero disables reminders
    pub remind_interval: u32,
    /// Override the backend's own skip-translated behavior
    pub skip_translated: Option<bool>,
    /// Cap on source characters per batch; the effective budget is the
    /// smaller of this and the backend's declared limit
    pub max_batch_chars: Option<usize>,
    /// Cap on in-flight batches; the effective concurrency is the smaller
    /// of this and the backend's declared limit
    pub max_concurrency: Option<usize>,
    /// Requests per minute; unset falls back to the backend's declared rate
    /// limit
    pub rate_limit: Option<u32>,
}

impl From<&BackendSettings> for SchedulerOptions {
    fn from(settings: &BackendSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_backoff_ms: settings.retry_backoff_ms,
            timeout_secs: settings.timeout_secs,
            remind_interval: settings.remind_interval,
            skip_translated: settings.skip_translated,
            max_batch_chars: settings.max_batch_chars,
            max_concurrency: settings.max_concurrency,
            rate_limit: settings.rate_limit,
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        (&BackendSettings::default()).into()
    }
}

/// What one scheduler run did to a book
#[derive(Debug, Default)]
pub struct SchedulerReport {
    /// Lines that received a translation
    pub translated: usize,
    /// Lines left untouched because they were already translated
    pub skipped: usize,
    /// Terminal per-line failures with identity and reason
    pub failed: Vec<(String, String)>,
    /// Number of `translate_batch` calls issued, retries included
    pub batches_dispatched: usize,
}

impl SchedulerReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: SchedulerReport) {
        self.translated += other.translated;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
        self.batches_dispatched += other.batches_dispatched;
    }
}

/// One unit of work: a run of line indices within a single episode
#[derive(Debug, Clone)]
struct Batch {
    ordinal: usize,
    chapter_idx: usize,
    episode_idx: usize,
    line_indices: Vec<usize>,
    lines: Vec<String>,
    episode_title: String,
}

/// Result of driving one batch through retries
enum BatchDisposition {
    /// One outcome per input line, same order
    Outcomes(Vec<LineOutcome>),
    /// Retries exhausted; caller decides between bisection and failure
    Exhausted(String),
}

/// Scheduler for one translator role over one book
pub struct TranslationScheduler {
    translator: Arc<dyn Translator>,
    options: SchedulerOptions,
    ctx: RoleContext,
    /// Batches dispatched to this translator instance, for reminder cadence
    dispatch_counter: AtomicU64,
    /// Minimum spacing between dispatches derived from the effective
    /// requests-per-minute rate limit
    rate_interval: Option<Duration>,
    last_dispatch: Mutex<Option<Instant>>,
    progress: Option<ProgressFn>,
}

impl TranslationScheduler {
    pub fn new(
        translator: Arc<dyn Translator>,
        options: SchedulerOptions,
        ctx: RoleContext,
    ) -> Self {
        let rate_interval = options
            .rate_limit
            .or(translator.limits().rate_limit)
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / u64::from(rpm)));
        Self {
            translator,
            options,
            ctx,
            dispatch_counter: AtomicU64::new(0),
            rate_interval,
            last_dispatch: Mutex::new(None),
            progress: None,
        }
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Translate every pending line of the book through this translator.
    ///
    /// Lines already carrying a translation are skipped when the backend's
    /// `skip_translated` flag is set; with the flag cleared every non-blank
    /// line is reprocessed. Line order within an episode is preserved in the
    /// output regardless of batch completion order.
    pub async fn translate_book(&self, book: &mut Book, task: &Task) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        let limits = self.translator.limits();
        // Configured caps tighten the backend's declared limits, never widen
        let skip_translated = self
            .options
            .skip_translated
            .unwrap_or_else(|| self.translator.skip_translated());
        let max_batch_chars = match self.options.max_batch_chars {
            Some(cap) => cap.min(limits.max_batch_chars),
            None => limits.max_batch_chars,
        };

        let mut queue: VecDeque<Batch> = VecDeque::new();
        let mut next_ordinal = 0;
        for (chapter_idx, chapter) in book.chapters.iter().enumerate() {
            for (episode_idx, episode) in chapter.episodes.iter().enumerate() {
                if skip_translated {
                    report.skipped += episode
                        .lines
                        .iter()
                        .filter(|l| !l.is_blank() && l.translated.is_some())
                        .count();
                }
                for group in batch_line_indices(episode, skip_translated, max_batch_chars) {
                    queue.push_back(Batch {
                        ordinal: next_ordinal,
                        chapter_idx,
                        episode_idx,
                        lines: group
                            .iter()
                            .map(|&i| episode.lines[i].content().to_string())
                            .collect(),
                        line_indices: group,
                        episode_title: episode.title.clone(),
                    });
                    next_ordinal += 1;
                }
            }
        }

        if queue.is_empty() {
            debug!(
                "{}: nothing to translate for {}",
                self.translator.name(),
                task.label()
            );
            return report;
        }

        let concurrency = match self.options.max_concurrency {
            Some(cap) => cap.min(limits.max_concurrency),
            None => limits.max_concurrency,
        }
        .max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let book_title = book.title.clone();
        let mut settled = 0usize;
        let mut known_total = queue.len();

        // Work-queue rounds: dispatch everything queued, apply what succeeded,
        // requeue bisected halves of what did not.
        while !queue.is_empty() {
            let round: Vec<Batch> = queue.drain(..).collect();
            let mut results = stream::iter(round)
                .map(|batch| {
                    let semaphore = Arc::clone(&semaphore);
                    let book_title = book_title.as_str();
                    async move {
                        // Semaphore bounds in-flight batches per translator
                        // instance across all episodes of the book
                        let _permit = semaphore.acquire().await.expect("semaphore closed");
                        let disposition = self.run_batch(&batch, task, book_title).await;
                        (batch, disposition)
                    }
                })
                .buffer_unordered(concurrency)
                .collect::<Vec<_>>()
                .await;

            // Deterministic application order regardless of completion order
            results.sort_by_key(|(batch, _)| batch.ordinal);

            for (batch, disposition) in results {
                match disposition {
                    BatchDisposition::Outcomes(outcomes) => {
                        settled += 1;
                        self.apply_outcomes(book, &batch, outcomes, task, &mut report);
                    }
                    BatchDisposition::Exhausted(reason) if batch.line_indices.len() > 1 => {
                        // Bisect to isolate the offending content
                        let mid = batch.line_indices.len() / 2;
                        debug!(
                            "{}: bisecting a {}-line batch after exhausted retries ({})",
                            self.translator.name(),
                            batch.line_indices.len(),
                            reason
                        );
                        for (ordinal_offset, range) in
                            [(0, 0..mid), (1, mid..batch.line_indices.len())]
                        {
                            queue.push_back(Batch {
                                ordinal: next_ordinal + ordinal_offset,
                                chapter_idx: batch.chapter_idx,
                                episode_idx: batch.episode_idx,
                                line_indices: batch.line_indices[range.clone()].to_vec(),
                                lines: batch.lines[range].to_vec(),
                                episode_title: batch.episode_title.clone(),
                            });
                        }
                        next_ordinal += 2;
                        known_total += 1;
                    }
                    BatchDisposition::Exhausted(reason) => {
                        settled += 1;
                        let line_idx = batch.line_indices[0];
                        let identity = format!(
                            "{}/{}#{}",
                            task.url, batch.episode_title, line_idx
                        );
                        warn!(
                            "{}: line {} failed permanently: {}",
                            self.translator.name(),
                            identity,
                            reason
                        );
                        report.failed.push((identity, reason));
                    }
                }
                if let Some(progress) = &self.progress {
                    progress(settled, known_total);
                }
            }
        }

        report.batches_dispatched = self.dispatch_counter.load(Ordering::SeqCst) as usize;
        report
    }

    /// Drive one batch through the retry policy.
    ///
    /// Transport errors and timeouts consume the bounded retry budget; rate
    /// limits back off on their own budget and never trigger bisection.
    async fn run_batch(
        &self,
        batch: &Batch,
        task: &Task,
        book_title: &str,
    ) -> BatchDisposition {
        let mut transport_attempts: u32 = 0;
        let mut rate_limit_attempts: u32 = 0;
        let rate_limit_cap = self.options.max_retries.saturating_mul(3).max(3);

        loop {
            self.pace_dispatch().await;
            let dispatch = self.dispatch_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let reminder_due = self.options.remind_interval > 0
                && dispatch % u64::from(self.options.remind_interval) == 0;
            let batch_ctx = BatchContext {
                source_lang: &task.source_lang,
                target_lang: &task.target_lang,
                glossary: &task.glossary,
                reminder_due,
                book_title,
                episode_title: &batch.episode_title,
            };

            let call = tokio::time::timeout(
                Duration::from_secs(self.options.timeout_secs),
                self.translator
                    .translate_batch(&batch.lines, &batch_ctx, &self.ctx),
            )
            .await;

            let error = match call {
                Ok(Ok(outcomes)) => {
                    if outcomes.len() == batch.lines.len() {
                        return BatchDisposition::Outcomes(outcomes);
                    }
                    // A backend that answers with the wrong shape is treated
                    // like a transport failure and retried
                    TranslateError::Transport(format!(
                        "backend returned {} outcomes for {} lines",
                        outcomes.len(),
                        batch.lines.len()
                    ))
                }
                Ok(Err(error)) => error,
                Err(_) => TranslateError::Timeout(self.options.timeout_secs),
            };

            let delay = match &error {
                TranslateError::RateLimited {
                    retry_after_secs, ..
                } => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts > rate_limit_cap {
                        return BatchDisposition::Exhausted(error.to_string());
                    }
                    match retry_after_secs {
                        Some(secs) => Duration::from_secs(*secs),
                        None => self.backoff_delay(rate_limit_attempts),
                    }
                }
                _ => {
                    transport_attempts += 1;
                    if transport_attempts > self.options.max_retries {
                        return BatchDisposition::Exhausted(error.to_string());
                    }
                    self.backoff_delay(transport_attempts)
                }
            };

            warn!(
                "{}: batch of {} lines failed ({}), retrying in {:?}",
                self.translator.name(),
                batch.lines.len(),
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait until the requests-per-minute budget allows another dispatch.
    ///
    /// Dispatch slots are handed out under the lock, so concurrent batches
    /// queue up behind each other instead of bursting past the limit.
    async fn pace_dispatch(&self) {
        let Some(interval) = self.rate_interval else {
            return;
        };
        let mut last = self.last_dispatch.lock().await;
        let now = Instant::now();
        let slot = match *last {
            Some(prev) => (prev + interval).max(now),
            None => now,
        };
        if slot > now {
            tokio::time::sleep_until(slot).await;
        }
        *last = Some(slot);
    }

    /// Exponential backoff with jitter, doubled per attempt
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.options.retry_backoff_ms.max(1);
        let exp = base.saturating_mul(1u64 << attempt.min(10).saturating_sub(1));
        let jitter = rand::rng().random_range(0..=base / 2 + 1);
        Duration::from_millis(exp + jitter)
    }

    /// Write a batch's outcomes back into the book, preserving line order
    fn apply_outcomes(
        &self,
        book: &mut Book,
        batch: &Batch,
        outcomes: Vec<LineOutcome>,
        task: &Task,
        report: &mut SchedulerReport,
    ) {
        let episode = &mut book.chapters[batch.chapter_idx].episodes[batch.episode_idx];
        for (&line_idx, outcome) in batch.line_indices.iter().zip(outcomes) {
            match outcome {
                LineOutcome::Translated(text) => {
                    episode.lines[line_idx].set_translated(self.translator.name(), text);
                    report.translated += 1;
                }
                LineOutcome::Rejected(reason) => {
                    let identity =
                        format!("{}/{}#{}", task.url, batch.episode_title, line_idx);
                    warn!(
                        "{}: line {} rejected by backend: {}",
                        self.translator.name(),
                        identity,
                        reason
                    );
                    report.failed.push((identity, reason));
                }
            }
        }
    }
}

/// Group an episode's candidate lines into consecutive runs capped by the
/// backend's character budget
fn batch_line_indices(
    episode: &Episode,
    skip_translated: bool,
    max_batch_chars: usize,
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_chars = 0usize;
    let budget = max_batch_chars.max(1);

    for (idx, line) in episode.lines.iter().enumerate() {
        let candidate =
            !line.is_blank() && (line.translated.is_none() || !skip_translated);
        if !candidate {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            continue;
        }

        let chars = line.content().chars().count();
        if !current.is_empty() && current_chars + chars > budget {
            groups.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(idx);
        current_chars += chars;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
