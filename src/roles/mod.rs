/*!
 * Role capability families and the runtime registry.
 *
 * A role is a named instance of one of three capability families:
 * - `Fetcher`: pulls a book structure and episode content from a source site
 * - `Translator`: fills translations for a batch of lines
 * - `Exporter`: renders a finalized book into an artifact
 *
 * Roles are interchangeable within a family and selected by name from task
 * configuration. Fetcher selection for a task with no explicit fetcher probes
 * each registered fetcher's `can_handle` predicate in registration order.
 */

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::app_config::Task;
use crate::book::{Book, EpisodeRef};
use crate::errors::{FetchError, RegistryError, TranslateError};

pub mod html;
pub mod mock;

/// Generate a default role name with a family prefix
pub fn default_role_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

/// Process-scoped state handed to every role at call time.
///
/// Built once at startup and shared; roles never construct their own HTTP
/// clients or reach for ambient globals.
#[derive(Clone)]
pub struct RoleContext {
    /// Shared HTTP client for all network-facing roles
    pub client: reqwest::Client,
    /// Directory exporters write artifacts into
    pub output_dir: PathBuf,
}

impl RoleContext {
    pub fn new(client: reqwest::Client, output_dir: PathBuf) -> Self {
        Self { client, output_dir }
    }
}

/// One glossary guidance pair, scoped to a task
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlossaryEntry {
    /// Term as it appears in the source text
    pub source: String,
    /// Preferred rendering in the target language
    pub target: String,
}

/// Size and rate limits a translator backend declares about itself
#[derive(Debug, Clone, Copy)]
pub struct TranslatorLimits {
    /// Maximum total characters of source text per batch
    pub max_batch_chars: usize,
    /// Maximum concurrent in-flight batches this backend tolerates
    pub max_concurrency: usize,
    /// Requests per minute the backend allows, if it declares one
    pub rate_limit: Option<u32>,
}

impl Default for TranslatorLimits {
    fn default() -> Self {
        Self {
            max_batch_chars: 1024,
            max_concurrency: 4,
            rate_limit: None,
        }
    }
}

/// Per-line result of a batch translation call.
///
/// A rejection is terminal for the line on this translator; transport-level
/// failures are reported for the whole batch through `TranslateError` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// The backend produced a translation for the line
    Translated(String),
    /// The backend declined this line's content; not retried
    Rejected(String),
}

/// Surrounding context sent along with a batch so backends can keep
/// terminology and tone consistent
#[derive(Debug, Clone)]
pub struct BatchContext<'a> {
    /// Source language tag of the task
    pub source_lang: &'a str,
    /// Target language tag of the task
    pub target_lang: &'a str,
    /// Glossary pairs for the task
    pub glossary: &'a [GlossaryEntry],
    /// Whether the full glossary should be re-injected into the request
    /// context (periodic reminder against backend drift)
    pub reminder_due: bool,
    /// Title of the book being translated
    pub book_title: &'a str,
    /// Title of the episode being translated
    pub episode_title: &'a str,
}

/// Capability family: pulls structure and content from a source site
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Registered name of this instance
    fn name(&self) -> &str;

    /// Whether this fetcher understands the given source URL
    fn can_handle(&self, url: &str) -> bool;

    /// Fetch the current remote structure as a book skeleton: chapters and
    /// episodes with stable ids, titles and positions, but no line content
    async fn fetch_structure(&self, task: &Task, ctx: &RoleContext) -> Result<Book, FetchError>;

    /// Fetch the ordered raw line text of one episode
    async fn fetch_content(
        &self,
        episode: &EpisodeRef,
        ctx: &RoleContext,
    ) -> Result<Vec<String>, FetchError>;
}

/// Capability family: fills translations for a batch of lines
#[async_trait]
pub trait Translator: Send + Sync {
    /// Registered name of this instance
    fn name(&self) -> &str;

    /// Declared batch size, concurrency and rate limits
    fn limits(&self) -> TranslatorLimits;

    /// When true, a line whose `translated` is already set is left untouched
    /// and never dispatched to this backend
    fn skip_translated(&self) -> bool {
        true
    }

    /// Translate a batch of source lines, returning one outcome per input
    /// line in the same order
    async fn translate_batch(
        &self,
        lines: &[String],
        batch_ctx: &BatchContext<'_>,
        ctx: &RoleContext,
    ) -> Result<Vec<LineOutcome>, TranslateError>;
}

/// Capability family: renders a finalized book into an artifact
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Registered name of this instance
    fn name(&self) -> &str;

    /// Produce an artifact from the finalized tree, returning its location
    async fn export(
        &self,
        book: &Book,
        task: &Task,
        ctx: &RoleContext,
    ) -> anyhow::Result<PathBuf>;
}

impl std::fmt::Debug for dyn Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("name", &self.name()).finish()
    }
}

impl std::fmt::Debug for dyn Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator").field("name", &self.name()).finish()
    }
}

impl std::fmt::Debug for dyn Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter").field("name", &self.name()).finish()
    }
}

/// A named role instance of any capability family
#[derive(Clone)]
pub enum Role {
    Fetcher(Arc<dyn Fetcher>),
    Translator(Arc<dyn Translator>),
    Exporter(Arc<dyn Exporter>),
}

impl Role {
    /// Registered name of the instance
    pub fn name(&self) -> &str {
        match self {
            Role::Fetcher(f) => f.name(),
            Role::Translator(t) => t.name(),
            Role::Exporter(e) => e.name(),
        }
    }

    /// Capability family label, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Role::Fetcher(_) => "fetcher",
            Role::Translator(_) => "translator",
            Role::Exporter(_) => "exporter",
        }
    }
}

/// Runtime registry mapping role names to instances.
///
/// Registration order is significant: fetcher auto-selection probes in the
/// order roles were registered.
#[derive(Default)]
pub struct RoleRegistry {
    roles: Vec<Role>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role instance; duplicate names are rejected
    pub fn register(&mut self, role: Role) -> Result<(), RegistryError> {
        if self.roles.iter().any(|r| r.name() == role.name()) {
            return Err(RegistryError::DuplicateRole(role.name().to_string()));
        }
        self.roles.push(role);
        Ok(())
    }

    /// Whether any role carries this name
    pub fn contains(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name() == name)
    }

    fn get(&self, name: &str) -> Result<&Role, RegistryError> {
        self.roles
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| RegistryError::UnknownRole(name.to_string()))
    }

    /// Look up a fetcher by name
    pub fn fetcher(&self, name: &str) -> Result<Arc<dyn Fetcher>, RegistryError> {
        match self.get(name)? {
            Role::Fetcher(f) => Ok(Arc::clone(f)),
            other => Err(RegistryError::WrongRole {
                name: other.name().to_string(),
                expected: "fetcher",
            }),
        }
    }

    /// Look up a translator by name
    pub fn translator(&self, name: &str) -> Result<Arc<dyn Translator>, RegistryError> {
        match self.get(name)? {
            Role::Translator(t) => Ok(Arc::clone(t)),
            other => Err(RegistryError::WrongRole {
                name: other.name().to_string(),
                expected: "translator",
            }),
        }
    }

    /// Look up an exporter by name
    pub fn exporter(&self, name: &str) -> Result<Arc<dyn Exporter>, RegistryError> {
        match self.get(name)? {
            Role::Exporter(e) => Ok(Arc::clone(e)),
            other => Err(RegistryError::WrongRole {
                name: other.name().to_string(),
                expected: "exporter",
            }),
        }
    }

    /// Resolve the fetcher for a task.
    ///
    /// An explicit fetcher name wins; otherwise each registered fetcher is
    /// probed with `can_handle` in registration order and the first match is
    /// used.
    pub fn resolve_fetcher(&self, task: &Task) -> Result<Arc<dyn Fetcher>, RegistryError> {
        if let Some(name) = &task.fetcher {
            return self.fetcher(name);
        }

        for role in &self.roles {
            if let Role::Fetcher(f) = role {
                if f.can_handle(&task.url) {
                    return Ok(Arc::clone(f));
                }
            }
        }
        Err(RegistryError::NoFetcherMatched(task.url.clone()))
    }
}
