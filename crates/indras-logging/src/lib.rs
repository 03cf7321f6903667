//! JSONL logging with per-client context for Indras read-state clients
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for log aggregation (default)
//! - **Client Context**: Tag spans with the client that opened them
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use indras_logging::{UnreadSubscriberBuilder, LogConfig};
//!
//! // JSONL to stdout
//! UnreadSubscriberBuilder::new().init();
//!
//! // Pretty human-readable output
//! UnreadSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Client Context
//!
//! ```ignore
//! use indras_logging::ClientContextGuard;
//!
//! let _guard = ClientContextGuard::new("user-7");
//! tracing::info_span!("replay").in_scope(|| tracing::info!("Applying event"));
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, FilterConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{ClientContextData, ClientContextGuard};
pub use layers::{ClientContextExtension, ClientContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid logging config: {0}")]
    Config(String),

    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subscriber init failed: {0}")]
    Init(String),
}

/// Builder for configuring and initializing the logging subscriber
///
/// By default console output uses JSONL. Use [`LogConfig::development()`]
/// for human-readable output.
pub struct UnreadSubscriberBuilder {
    config: LogConfig,
}

impl UnreadSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output on drop and must be kept
    /// alive for as long as logs should be written.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = self.config.env_filter()?;

        let (file_layer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = file_writer(file_config)?;
                (Some(layers::jsonl_layer(writer, &self.config.jsonl)), Some(guard))
            }
            None => (None, None),
        };

        let console = &self.config.console;
        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });
        let jsonl_console = (console.enabled && !console.pretty)
            .then(|| layers::jsonl_layer(std::io::stdout, &self.config.jsonl));

        Registry::default()
            .with(filter)
            .with(ClientContextLayer::new())
            .with(pretty_console)
            .with(jsonl_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;

        Ok(guard)
    }

    /// Install the subscriber, reporting failure on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }
}

impl Default for UnreadSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for file output
///
/// `Never` rotation truncates a single file; the others roll by time and
/// prune old files past `max_files`.
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to stdout)
pub fn init_default() -> Option<WorkerGuard> {
    UnreadSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    UnreadSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests; a subscriber already being set is fine
pub fn init_testing() {
    let _ = UnreadSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
