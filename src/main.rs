// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::app_config::Config;
use crate::pipeline::Orchestrator;
use crate::roles::html::{HtmlExporter, JsonExporter};
use crate::roles::{Role, RoleContext, RoleRegistry};
use crate::store::BookStore;

mod app_config;
mod book;
mod errors;
mod lang;
mod pipeline;
mod roles;
mod store;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured task: fetch, translate, export (default command)
    Run(RunArgs),

    /// Write a starter configuration file
    Init {
        /// Configuration file path to create
        #[arg(short, long, default_value = "bookforge.json")]
        config_path: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions for bookforge
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "bookforge.json")]
    config_path: String,

    /// Only run the task whose label or URL matches
    #[arg(short = 'n', long)]
    task: Option<String>,

    /// Directory exporters write artifacts into
    #[arg(short, long, default_value = "out")]
    output_dir: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// BookForge - incremental web novel translation
///
/// Fetches serialized web novels, translates them with pluggable backends
/// and exports the result, touching only what changed since the last run.
#[derive(Parser, Debug)]
#[command(name = "bookforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental web novel scraping, translation and export")]
#[command(long_about = "BookForge fetches serialized web novels, translates them with pluggable \
backends and exports the result. Re-running a task fetches only what changed at the source and \
retranslates only invalidated lines.

EXAMPLES:
    bookforge run                               # Run every task in bookforge.json
    bookforge run -n my-novel                   # Run a single task by label
    bookforge run -c other.json -l debug        # Alternate config, debug logging
    bookforge init                              # Write a starter config
    bookforge completions bash > bookforge.bash # Generate bash completions

CONFIGURATION:
    Tasks, translator chains, glossaries and per-backend settings live in
    bookforge.json. Use a different file with --config-path. On first run a
    starter config is written; 'bookforge init' does the same explicitly.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "bookforge.json")]
    config_path: String,

    /// Only run the task whose label or URL matches
    #[arg(short = 'n', long)]
    task: Option<String>,

    /// Directory exporters write artifacts into
    #[arg(short, long, default_value = "out")]
    output_dir: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "bookforge", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Init { config_path, force }) => init_config(&config_path, force),
        Some(Commands::Run(args)) => run(args).await,
        None => {
            // Default behavior - use top-level args for backwards compatibility
            run(RunArgs {
                config_path: cli.config_path,
                task: cli.task,
                output_dir: cli.output_dir,
                log_level: cli.log_level,
            })
            .await
        }
    }
}

/// Write a starter configuration with one commented-out sample task
fn init_config(config_path: &str, force: bool) -> Result<()> {
    if Path::new(config_path).exists() && !force {
        return Err(anyhow!(
            "Config file already exists at '{}'; pass --force to overwrite",
            config_path
        ));
    }
    let mut config = Config::default();
    config.tasks.push(app_config::Task {
        url: "https://example.com/novel/1".to_string(),
        friendly_name: "sample".to_string(),
        exporters: vec!["html".to_string()],
        ..app_config::Task::default()
    });
    config
        .write_to_file(config_path)
        .with_context(|| format!("Failed to write starter config to '{}'", config_path))?;
    info!("Wrote starter config to '{}'", config_path);
    Ok(())
}

async fn run(options: RunArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let config_log_level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level_filter(&config_log_level));
    }

    let mut config = if Path::new(&options.config_path).exists() {
        Config::from_file(&options.config_path)
            .with_context(|| format!("Failed to load config from '{}'", options.config_path))?
    } else {
        // Create default configuration if not exists
        warn!(
            "Config file not found at '{}', creating default config.",
            options.config_path
        );
        let mut config = Config::default();
        if let Some(log_level) = &options.log_level {
            config.log_level = log_level.clone().into();
        }
        config
            .write_to_file(&options.config_path)
            .with_context(|| {
                format!("Failed to write default config to '{}'", options.config_path)
            })?;
        config
    };

    // If log level was not set via command line, update it from config now
    if options.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    if let Some(wanted) = &options.task {
        config
            .tasks
            .retain(|t| t.label() == wanted || t.url == *wanted);
        if config.tasks.is_empty() {
            return Err(anyhow!("No configured task matches '{}'", wanted));
        }
    }
    if config.tasks.is_empty() {
        warn!("No tasks configured in '{}'", options.config_path);
        return Ok(());
    }

    // Built-in roles; site fetchers and translation backends register here
    let mut registry = RoleRegistry::new();
    registry.register(Role::Exporter(Arc::new(HtmlExporter::new("html"))))?;
    registry.register(Role::Exporter(Arc::new(JsonExporter::new("json"))))?;
    config
        .validate_roles(&registry)
        .context("Configuration references unknown roles")?;

    let client = config.client.build_client()?;
    let store_dir = match &config.store.path {
        Some(path) => path.clone(),
        None => BookStore::default_store_dir()?,
    };
    let store = BookStore::open(&store_dir, config.store.write_buffer_size)?;
    let ctx = RoleContext::new(client, options.output_dir.clone());

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} batches {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let bar = progress_bar.clone();
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        store,
        Arc::new(config),
        ctx,
    )
    .with_scheduler_progress(Arc::new(move |settled, total| {
        bar.set_length(total as u64);
        bar.set_position(settled as u64);
    }));

    // Ctrl-C stops the run at the next stage checkpoint
    let abort = orchestrator.abort_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping at the next checkpoint");
            abort.store(true, Ordering::SeqCst);
        }
    });

    let results = orchestrator.run_all().await;
    progress_bar.finish_and_clear();

    let mut failures = 0;
    for (label, result) in &results {
        match result {
            Ok(report) => {
                info!(
                    "[{}] Done: {} fetched, {} translated, {} failed line(s), {} artifact(s), {} pending",
                    label,
                    report.episodes_fetched,
                    report.translation.translated,
                    report.translation.failed.len(),
                    report.artifacts.len(),
                    report.pending_after
                );
            }
            Err(err) => {
                failures += 1;
                error!("[{}] Failed: {:#}", label, err);
            }
        }
    }

    if failures > 0 {
        Err(anyhow!("{} of {} task(s) failed", failures, results.len()))
    } else {
        Ok(())
    }
}
