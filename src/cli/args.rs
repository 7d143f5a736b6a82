//! Arguments shared by the `bgremove` and `bgremove-server` binaries

use crate::config::{checksums_disabled_by_env, ExecutionProvider, RemovalConfig};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Options that decide how the model session is built
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Model variant (rmbg14, u2net, u2netp, isnet-general-use) [default: rmbg14]
    #[arg(short, long, env = "BGREMOVE_MODEL")]
    pub model: Option<String>,

    /// Execution provider (auto, cpu, cuda, coreml) [default: auto]
    #[arg(short, long, value_name = "PROVIDER")]
    pub execution_provider: Option<ExecutionProvider>,

    /// Number of intra-op threads (0 = auto-detect)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Use a custom model cache directory instead of $U2NET_HOME or ~/.u2net
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Skip SHA-256 verification of model files (also set by MODEL_CHECKSUM_DISABLED)
    #[arg(long)]
    pub no_checksum: bool,

    /// Load base settings from a JSON config file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl SessionArgs {
    /// Merge the config file (if any) with the command-line flags
    ///
    /// # Errors
    /// - Config file cannot be read or parsed
    /// - Resulting configuration is invalid
    pub fn to_config(&self) -> Result<RemovalConfig> {
        let mut config = match &self.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }
        if let Some(provider) = self.execution_provider {
            config.execution_provider = provider;
        }
        if let Some(threads) = self.threads {
            config.intra_threads = threads;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if self.no_checksum || checksums_disabled_by_env() {
            config.verify_checksums = false;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_defaults() {
        let args = SessionArgs {
            model: Some("u2netp".to_string()),
            execution_provider: Some(ExecutionProvider::Cpu),
            threads: Some(2),
            no_checksum: true,
            ..SessionArgs::default()
        };

        let config = args.to_config().unwrap();
        assert_eq!(config.model, "u2netp");
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.intra_threads, 2);
        assert!(!config.verify_checksums);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model": "u2net", "intra_threads": 8}}"#).unwrap();

        let args = SessionArgs {
            threads: Some(1),
            config: Some(file.path().to_path_buf()),
            ..SessionArgs::default()
        };

        let config = args.to_config().unwrap();
        assert_eq!(config.model, "u2net");
        assert_eq!(config.intra_threads, 1);
    }

    #[test]
    fn test_invalid_thread_count_rejected() {
        let args = SessionArgs {
            threads: Some(100_000),
            ..SessionArgs::default()
        };
        assert!(args.to_config().is_err());
    }
}
