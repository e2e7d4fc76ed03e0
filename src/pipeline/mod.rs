/*!
 * The incremental pipeline: change detection, batch translation scheduling
 * and task orchestration.
 *
 * - `change_detector`: diffs fetched structure/content against the store
 * - `scheduler`: drives pending lines through one translator with batching,
 *   retry, bisection and glossary reminders
 * - `orchestrator`: runs whole tasks stage by stage with store checkpoints
 */

pub mod change_detector;
pub mod orchestrator;
pub mod scheduler;

pub use change_detector::{StructureChanges, merge_content, merge_structure, pending_lines};
pub use orchestrator::{Orchestrator, TaskReport};
pub use scheduler::{ProgressFn, SchedulerOptions, SchedulerReport, TranslationScheduler};
