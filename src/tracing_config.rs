//! Tracing configuration for structured logging
//!
//! The library only emits events and spans. Binaries (the `roomstage` CLI,
//! or an embedding service) install a subscriber through [`TracingConfig`].
//! The [`spans`] and [`events`] helpers keep field names consistent across
//! modules so a whole request can be filtered by `request_id`.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable, coloured
    Console,
    /// Plain single-line output for CI logs
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    Console,
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it at the end of `main`
#[derive(Debug, Default)]
#[must_use]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Subscriber configuration
#[derive(Debug)]
pub struct TracingConfig {
    /// 0 = info, 1 = debug, 2+ = trace for this crate
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Full `EnvFilter` directive, overrides `verbosity`
    pub env_filter: Option<String>,
    /// Logged once at startup for correlating a CLI run
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// HTTP internals stay at `warn` unless a custom filter is supplied.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "roomstage=info,hyper=warn,reqwest=warn,warn",
            1 => "roomstage=debug,hyper=warn,reqwest=info,info",
            _ => "roomstage=trace,hyper=info,reqwest=debug,debug",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// When the filter directive is invalid or a subscriber is already set.
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let layer = fmt::layer().with_ansi(false).with_target(false).compact();
                registry.with(layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                let (writer, file_guard) = file_writer(path);
                guard._file = Some(file_guard);
                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                        registry.with(layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(layer).try_init()?;
                    },
                }
            },

            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::Both(path)) => {
                let (writer, file_guard) = file_writer(path);
                guard._file = Some(file_guard);
                let console = fmt::layer().with_ansi(true).with_target(false).compact();

                #[cfg(feature = "tracing-json")]
                let file = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_span_list(true);
                #[cfg(not(feature = "tracing-json"))]
                let file = fmt::layer().with_ansi(false).with_writer(writer).compact();

                registry.with(console).with(file).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Staging session started");
        }
        Ok(guard)
    }
}

#[cfg(feature = "tracing-files")]
fn file_writer(
    path: &std::path::Path,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("roomstage.log"));
    tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
}

/// Subscriber with CLI defaults
///
/// # Errors
/// See [`TracingConfig::init`].
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(TracingFormat::Console)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

/// Minimal subscriber driven by `RUST_LOG`; a no-op when one is already set
#[cfg(feature = "cli")]
pub fn init_library_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!("Library tracing initialized");
    }
}

/// Span constructors shared across the pipeline
pub mod spans {
    use tracing::{Level, Span};

    /// Root span of one staging request
    pub fn request(request_id: &str, style: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "staging_request",
            request_id = %request_id,
            style = %style
        )
    }

    pub fn normalization(source_bytes: usize) -> Span {
        tracing::span!(Level::DEBUG, "normalization", source_bytes)
    }

    pub fn planning(model: &str) -> Span {
        tracing::span!(Level::DEBUG, "planning", model = %model)
    }

    /// One generation pass (`coherence`, `furniture`, `single`, `edit`, `mock`)
    pub fn pass(name: &str, strength: f32) -> Span {
        tracing::span!(Level::INFO, "pass", pass = %name, strength = f64::from(strength))
    }

    pub fn provider_call(provider: &str, operation: &str) -> Span {
        tracing::span!(
            Level::DEBUG,
            "provider_call",
            provider = %provider,
            operation = %operation
        )
    }

    pub fn persist(filename: &str) -> Span {
        tracing::span!(Level::DEBUG, "persist", filename = %filename)
    }
}

/// Event helpers for recurring log lines
pub mod events {
    use tracing::{debug, error, info, warn};

    /// User-facing progress line
    pub fn progress(message: &str) {
        info!("{}", message);
    }

    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// A stage failed and a degraded path is taken instead
    pub fn fallback_engaged(stage: &str, error: &dyn std::fmt::Display, fallback: &str) {
        warn!(stage = %stage, error = %error, fallback = %fallback, "Falling back");
    }

    /// A provider output was rejected by validation
    pub fn output_rejected(provider: &str, error: &dyn std::fmt::Display) {
        warn!(provider = %provider, error = %error, "Provider output rejected");
    }

    pub fn stage_timing(stage: &str, duration_ms: u64) {
        debug!(stage = %stage, duration_ms, "Stage finished");
    }
}
