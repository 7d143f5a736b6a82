//! Tracing configuration for the binaries
//!
//! The library only emits `tracing` events and spans (plus `log` records from
//! the download and cache layers). Subscribers are installed here, by the
//! binaries, and pick up `log` records through `tracing-subscriber`'s bridge.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the console subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output with colors (default)
    Console,
    /// Plain compact output for CI and log collectors
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Filter directive (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
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

    /// Set verbosity level (0-2+)
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

    /// Set a filter directive such as `bgremove_service=debug,tower_http=info`
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

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Filter directive that will be installed
    ///
    /// An explicit filter wins, then a non-empty `RUST_LOG`, then verbosity.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| self.verbosity_to_filter().to_string())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "tracing initialized");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults and a fresh session id
///
/// # Errors
/// - Same as [`TracingConfig::init`]
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();

    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(TracingFormat::Console)
        .with_session_id(session_id.clone())
        .init()?;

    Ok(session_id)
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for the whole lifetime of a CLI run or server process
    pub fn session(session_id: &str, model_name: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            model_name = %model_name
        )
    }

    pub fn model_loading(model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_name = %model_name,
            provider = %provider
        )
    }

    pub fn download(url: &str, destination: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "download",
            url = %url,
            destination = %destination.display()
        )
    }

    pub fn preprocessing(original_size: (u32, u32), target_size: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "preprocessing",
            original_width = original_size.0,
            original_height = original_size.1,
            target_width = target_size.0,
            target_height = target_size.1
        )
    }

    pub fn inference(backend: &str) -> Span {
        tracing::span!(Level::DEBUG, "inference", backend = %backend)
    }

    pub fn postprocessing(original_size: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "postprocessing",
            width = original_size.0,
            height = original_size.1
        )
    }
}
