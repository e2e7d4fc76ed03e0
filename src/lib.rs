/*!
 * # BookForge - incremental web novel translation
 *
 * A Rust library for scraping, translating and exporting serialized web
 * novels incrementally: re-running a task fetches only what changed at the
 * source, retranslates only invalidated lines and leaves everything else
 * untouched.
 *
 * ## Features
 *
 * - Normalized Book/Chapter/Episode/Line document tree with per-line
 *   content fingerprints
 * - Change detection by stable node identity: renames and reorders never
 *   duplicate content, delisted nodes are kept as orphans
 * - Buffered JSON document store with atomic write-then-rename persistence
 * - Pluggable role families (Fetcher, Translator, Exporter) behind a
 *   runtime registry
 * - Batch translation with bounded concurrency, retry with backoff,
 *   bisection of failing batches and periodic glossary reminders
 * - Checkpointed orchestration: interrupted runs resume from the last
 *   completed stage
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `book`: The normalized document tree and fingerprinting
 * - `store`: Buffered persistent book store
 * - `roles`: Role capability traits, registry and built-in implementations:
 *   - `roles::html`: Built-in HTML and JSON exporters
 *   - `roles::mock`: Scripted roles for testing
 * - `pipeline`: The incremental pipeline:
 *   - `pipeline::change_detector`: Structure and content diffing
 *   - `pipeline::scheduler`: Batch translation scheduling
 *   - `pipeline::orchestrator`: Stage-by-stage task execution
 * - `lang`: ISO language tag utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod book;
pub mod errors;
pub mod lang;
pub mod pipeline;
pub mod roles;
pub mod store;

// Re-export main types for easier usage
pub use app_config::{Config, Task};
pub use book::{Book, Chapter, Episode, EpisodeRef, Line, LineRef};
pub use errors::{AppError, FetchError, RegistryError, StoreError, TranslateError};
pub use pipeline::{Orchestrator, TaskReport, TranslationScheduler};
pub use roles::{Exporter, Fetcher, Role, RoleContext, RoleRegistry, Translator};
pub use store::BookStore;
