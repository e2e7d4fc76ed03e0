/*!
 * End-to-end task execution: structure fetch, content fetch, translation and
 * export, with a store flush checkpoint between stages.
 *
 * Each stage leaves the store consistent, so an interrupted run resumes from
 * the last completed checkpoint instead of starting over. Tasks run
 * concurrently and fail independently; within a task, one broken episode or
 * exporter never takes down the rest.
 */

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::app_config::{Config, Task};
use crate::book::EpisodeRef;
use crate::roles::{RoleContext, RoleRegistry};
use crate::store::BookStore;

use super::change_detector::{merge_content, merge_structure, pending_lines};
use super::scheduler::{ProgressFn, SchedulerReport, TranslationScheduler};

/// What one task run did, stage by stage
#[derive(Debug, Default)]
pub struct TaskReport {
    /// Task label the report belongs to
    pub label: String,
    /// Episodes the source listed for the first time
    pub new_episodes: usize,
    /// Stored episodes the source updated since the last run
    pub updated_episodes: usize,
    /// Stored nodes the source no longer lists, kept as-is
    pub orphaned: usize,
    /// Episodes whose content was fetched and merged
    pub episodes_fetched: usize,
    /// Episodes whose content fetch failed, with reasons
    pub fetch_failures: Vec<(String, String)>,
    /// Combined translation results across the task's translator chain
    pub translation: SchedulerReport,
    /// Artifacts produced, by exporter name
    pub artifacts: Vec<(String, PathBuf)>,
    /// Exporters that failed, with reasons
    pub export_failures: Vec<(String, String)>,
    /// Lines still untranslated when the run finished
    pub pending_after: usize,
}

/// Runs configured tasks against a role registry and a book store
pub struct Orchestrator {
    registry: Arc<RoleRegistry>,
    store: BookStore,
    config: Arc<Config>,
    ctx: RoleContext,
    abort: Arc<AtomicBool>,
    scheduler_progress: Option<ProgressFn>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RoleRegistry>,
        store: BookStore,
        config: Arc<Config>,
        ctx: RoleContext,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            ctx,
            abort: Arc::new(AtomicBool::new(false)),
            scheduler_progress: None,
        }
    }

    /// Attach a progress callback forwarded to every translation scheduler
    pub fn with_scheduler_progress(mut self, progress: ProgressFn) -> Self {
        self.scheduler_progress = Some(progress);
        self
    }

    /// Flag checked at stage boundaries; setting it stops runs at the next
    /// checkpoint with the store consistent
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::SeqCst) {
            bail!("run aborted");
        }
        Ok(())
    }

    /// Run every configured task concurrently.
    ///
    /// Each task's outcome is reported independently; one failing task never
    /// aborts the others.
    pub async fn run_all(&self) -> Vec<(String, Result<TaskReport>)> {
        let run_id = Uuid::new_v4();
        info!(
            "Starting run {} with {} task(s)",
            run_id,
            self.config.tasks.len()
        );

        let runs = self.config.tasks.iter().map(|task| async move {
            let label = task.label().to_string();
            let result = self.run_task(task).await;
            if let Err(error) = &result {
                error!("[{}] Task failed: {:#}", label, error);
            }
            (label, result)
        });
        let results = futures::future::join_all(runs).await;

        if let Err(error) = self.store.flush() {
            error!("Final store flush failed: {}", error);
        }
        info!("Run {} finished", run_id);
        results
    }

    /// Run one task through all four stages.
    ///
    /// Stage order: structure fetch and merge, content fetch per dirty
    /// episode, translation per configured translator, export per configured
    /// exporter. The store is flushed after every stage.
    pub async fn run_task(&self, task: &Task) -> Result<TaskReport> {
        let mut report = TaskReport {
            label: task.label().to_string(),
            ..TaskReport::default()
        };

        // Stage 1: structure
        self.check_abort()?;
        let fetcher = self.registry.resolve_fetcher(task)?;
        info!("[{}] Fetching structure via '{}'", task.label(), fetcher.name());
        let skeleton = fetcher
            .fetch_structure(task, &self.ctx)
            .await
            .with_context(|| format!("structure fetch for {}", task.url))?;
        let stored = self.store.load(&task.url)?;
        let (mut book, changes) = merge_structure(stored, skeleton);

        report.new_episodes = changes.new_episodes.len();
        report.updated_episodes = changes.updated_episodes.len();
        report.orphaned = changes.orphaned.len();
        if changes.is_empty() {
            info!("[{}] Structure unchanged", task.label());
        } else {
            info!(
                "[{}] Structure: {} new, {} updated, {} orphaned episode(s)",
                task.label(),
                report.new_episodes,
                report.updated_episodes,
                report.orphaned
            );
        }
        let to_fetch: Vec<EpisodeRef> = changes.episodes_to_fetch().cloned().collect();
        self.store.upsert(book.clone())?;
        self.store.flush()?;

        // Stage 2: content, one episode at a time so a broken episode only
        // costs itself
        for episode_ref in &to_fetch {
            self.check_abort()?;
            match fetcher.fetch_content(episode_ref, &self.ctx).await {
                Ok(raw_lines) => match book.resolve_mut(episode_ref) {
                    Some(episode) => {
                        let changed = merge_content(episode, raw_lines);
                        info!(
                            "[{}] Fetched {}: {} line(s) added or changed",
                            task.label(),
                            episode_ref,
                            changed
                        );
                        report.episodes_fetched += 1;
                        self.store.upsert(book.clone())?;
                    }
                    None => {
                        warn!(
                            "[{}] Fetched {} but it is gone from the merged tree",
                            task.label(),
                            episode_ref
                        );
                    }
                },
                Err(error) => {
                    warn!(
                        "[{}] Content fetch for {} failed: {}",
                        task.label(),
                        episode_ref,
                        error
                    );
                    report
                        .fetch_failures
                        .push((episode_ref.to_string(), error.to_string()));
                }
            }
        }
        self.store.flush()?;

        // Stage 3: translation, translators in configured order; lines a
        // translator leaves unfilled fall through to the next one
        for name in &task.translators {
            self.check_abort()?;
            let translator = self.registry.translator(name)?;
            let settings = self.config.backend(name);
            let mut scheduler = TranslationScheduler::new(
                translator,
                (&settings).into(),
                self.ctx.clone(),
            );
            if let Some(progress) = &self.scheduler_progress {
                scheduler = scheduler.with_progress(Arc::clone(progress));
            }

            let stage_report = scheduler.translate_book(&mut book, task).await;
            info!(
                "[{}] Translator '{}': {} translated, {} skipped, {} failed",
                task.label(),
                name,
                stage_report.translated,
                stage_report.skipped,
                stage_report.failed.len()
            );
            report.translation.merge(stage_report);
            self.store.upsert(book.clone())?;
            self.store.flush()?;
        }

        // Stage 4: export, each exporter independently
        self.check_abort()?;
        for name in &task.exporters {
            let exporter = self.registry.exporter(name)?;
            match exporter.export(&book, task, &self.ctx).await {
                Ok(path) => {
                    info!("[{}] Exporter '{}' wrote {:?}", task.label(), name, path);
                    report.artifacts.push((name.clone(), path));
                }
                Err(error) => {
                    warn!(
                        "[{}] Exporter '{}' failed: {:#}",
                        task.label(),
                        name,
                        error
                    );
                    report.export_failures.push((name.clone(), error.to_string()));
                }
            }
        }

        report.pending_after = pending_lines(&book).len();
        Ok(report)
    }
}
