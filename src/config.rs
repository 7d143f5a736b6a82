//! Configuration types for background removal operations

use crate::error::{RemovalError, Result};
use crate::models::DEFAULT_MODEL_NAME;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound accepted for intra-op thread counts
const MAX_THREADS: usize = 1024;

/// Environment variable that turns off artifact checksum verification when set
pub const CHECKSUM_DISABLED_ENV: &str = "MODEL_CHECKSUM_DISABLED";

/// Whether `MODEL_CHECKSUM_DISABLED` is present in the environment
#[must_use]
pub fn checksums_disabled_by_env() -> bool {
    std::env::var_os(CHECKSUM_DISABLED_ENV).is_some()
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(RemovalError::invalid_config(format!(
                "Unknown execution provider '{other}'. Expected one of: auto, cpu, cuda, coreml"
            ))),
        }
    }
}

/// Configuration for building a [`crate::RemovalSession`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Name of the model variant, resolved through the model registry
    pub model: String,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Cache home override (None = `$U2NET_HOME` or `~/.u2net`)
    pub cache_dir: Option<PathBuf>,

    /// Verify artifact checksums when a digest is known
    pub verify_checksums: bool,

    /// Render a progress bar while downloading the model
    pub show_progress: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_NAME.to_string(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            cache_dir: None,
            verify_checksums: !checksums_disabled_by_env(),
            show_progress: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_service::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .model("u2net")
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .intra_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.model, "u2net");
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// - Failed to read the file
    /// - Malformed JSON
    /// - Validation failure
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RemovalError::file_io_error("read config file", path, &e))?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            RemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Empty model name
    /// - Thread count above the supported maximum
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RemovalError::invalid_config("Model name cannot be empty"));
        }

        if self.intra_threads > MAX_THREADS {
            return Err(RemovalError::config_value_error(
                "intra threads",
                self.intra_threads,
                "0-1024",
                Some(0),
            ));
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads (0 = let the runtime decide)
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// HTTP adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind: SocketAddr,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub const DEFAULT_BIND: &'static str = "0.0.0.0:7009";
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 7009)),
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Solid RGBA color a cutout can be composited onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl BackgroundColor {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for BackgroundColor {
    type Err = RemovalError;

    /// Parse `r,g,b` or `r,g,b,a` (alpha defaults to 255)
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                RemovalError::invalid_input(format!("Invalid background color '{s}': {e}"))
            })?;

        match parts.as_slice() {
            [r, g, b] => Ok(Self::new(*r, *g, *b, 255)),
            [r, g, b, a] => Ok(Self::new(*r, *g, *b, *a)),
            _ => Err(RemovalError::invalid_input(format!(
                "Invalid background color '{s}': expected r,g,b or r,g,b,a"
            ))),
        }
    }
}

impl std::fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

/// Per-call output options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalOptions {
    /// Return the grayscale mask instead of the cutout
    pub only_mask: bool,
    /// Composite the cutout onto this color instead of leaving it transparent
    pub background: Option<BackgroundColor>,
}

impl RemovalOptions {
    #[must_use]
    pub fn mask_only() -> Self {
        Self {
            only_mask: true,
            background: None,
        }
    }

    #[must_use]
    pub fn with_background(mut self, color: BackgroundColor) -> Self {
        self.background = Some(color);
        self
    }
}
