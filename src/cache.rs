//! On-disk model cache
//!
//! Artifacts live flat in a single home directory, one `{name}.onnx` file per
//! model variant. The home is `$U2NET_HOME` when set, otherwise `~/.u2net`, so
//! models already fetched by other tools sharing that layout are reused.

use crate::error::{RemovalError, Result};
use crate::models::ModelDescriptor;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache home
pub const CACHE_HOME_ENV: &str = "U2NET_HOME";

/// Directory name used under the user's home when no override is set
pub const DEFAULT_CACHE_DIR_NAME: &str = ".u2net";

/// Information about a cached model artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModelInfo {
    /// Model name (file stem of the artifact)
    pub name: String,
    /// Path to the artifact
    pub path: PathBuf,
    /// Artifact size in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the cache at the default home, creating it if needed
    ///
    /// # Errors
    /// - Failed to determine the user's home directory
    /// - Failed to create the cache directory
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::cache_home()?)
    }

    /// Open the cache at a specific directory, creating it if needed
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                RemovalError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Platform-appropriate directory for cached model artifacts
    ///
    /// # Errors
    /// - No override is set and the home directory cannot be determined
    pub fn cache_home() -> Result<PathBuf> {
        resolve_cache_home(std::env::var_os(CACHE_HOME_ENV), dirs::home_dir())
    }

    /// Directory this cache reads and writes
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path the artifact of `descriptor` is (or will be) stored at
    #[must_use]
    pub fn model_path(&self, descriptor: &ModelDescriptor) -> PathBuf {
        self.cache_dir.join(descriptor.file_name())
    }

    /// Whether a non-empty artifact for `descriptor` exists
    #[must_use]
    pub fn is_model_cached(&self, descriptor: &ModelDescriptor) -> bool {
        fs::metadata(self.model_path(descriptor))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Scan the cache directory for model artifacts
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn list_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            RemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                RemovalError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();

            let is_onnx = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
            if !is_onnx || !path.is_file() {
                continue;
            }

            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                log::debug!("Skipping non UTF-8 cache entry: {}", path.display());
                continue;
            };

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            models.push(CachedModelInfo {
                name: name.to_string(),
                path: path.clone(),
                size_bytes,
            });
        }

        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    /// Remove the cached artifact of one model
    ///
    /// Returns `true` if a file was removed, `false` if nothing was cached.
    ///
    /// # Errors
    /// - Failed to remove the artifact
    pub fn clear_model(&self, descriptor: &ModelDescriptor) -> Result<bool> {
        let path = self.model_path(descriptor);

        if !path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", descriptor.name());
        fs::remove_file(&path)
            .map_err(|e| RemovalError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }

    /// Remove every cached artifact
    ///
    /// # Errors
    /// - Failed to read the cache directory or remove an artifact
    pub fn clear_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for model in self.list_cached_models()? {
            log::info!("Removing cached model: {}", model.name);
            fs::remove_file(&model.path).map_err(|e| {
                RemovalError::file_io_error("remove cached model", &model.path, &e)
            })?;
            removed.push(model.name);
        }

        Ok(removed)
    }
}

/// Cache home from an optional override and the user's home directory
fn resolve_cache_home(env_override: Option<OsString>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = env_override.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    home.map(|h| h.join(DEFAULT_CACHE_DIR_NAME)).ok_or_else(|| {
        RemovalError::invalid_config(format!(
            "Failed to determine home directory. Set the {CACHE_HOME_ENV} environment variable."
        ))
    })
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
