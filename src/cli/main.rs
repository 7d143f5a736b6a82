//! Background removal CLI tool
//!
//! `bgremove INPUT OUTPUT` removes the background of one image. Cache
//! maintenance flags run without inputs.

use super::args::SessionArgs;
use crate::{
    cache::{format_size, ModelCache, CACHE_HOME_ENV},
    config::{BackgroundColor, RemovalConfig, RemovalOptions},
    download::ModelDownloader,
    models::ModelRegistry,
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT", required_unless_present_any = ["list_models", "show_cache_dir", "only_download", "clear_cache", "show_providers"])]
    pub input: Option<PathBuf>,

    /// Output image file (format follows the extension, PNG when unknown)
    #[arg(value_name = "OUTPUT", required_unless_present_any = ["list_models", "show_cache_dir", "only_download", "clear_cache", "show_providers"])]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Write the grayscale mask instead of the cutout
    #[arg(long)]
    pub only_mask: bool,

    /// Composite the cutout onto a solid color, given as r,g,b or r,g,b,a
    #[arg(long, value_name = "COLOR")]
    pub bgcolor: Option<BackgroundColor>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List known models with their cache status and exit
    #[arg(long)]
    pub list_models: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Download the selected model but don't process any images
    #[arg(long)]
    pub only_download: bool,

    /// Clear cached models (pass --model on the command line to clear a specific model;
    /// BGREMOVE_MODEL is ignored here)
    #[arg(long)]
    pub clear_cache: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

impl Cli {
    fn removal_options(&self) -> RemovalOptions {
        RemovalOptions {
            only_mask: self.only_mask,
            background: self.bgcolor,
        }
    }
}

/// The model named by `--model` itself, ignoring `BGREMOVE_MODEL`
fn model_from_command_line(matches: &ArgMatches) -> Option<String> {
    match matches.value_source("model") {
        Some(ValueSource::CommandLine) => matches.get_one::<String>("model").cloned(),
        _ => None,
    }
}

pub async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.show_cache_dir {
        return show_current_cache_dir(cli.session.cache_dir.as_deref());
    }

    if cli.list_models {
        return list_models(cli.session.cache_dir.as_deref());
    }

    if cli.clear_cache {
        return clear_cache_models(&cli, model_from_command_line(&matches).as_deref());
    }

    let mut config = cli.session.to_config()?;
    config.show_progress = true;

    if cli.only_download {
        return download_model_only(&config).await;
    }

    let (Some(input), Some(output)) = (&cli.input, &cli.output) else {
        anyhow::bail!("Both INPUT and OUTPUT are required");
    };

    let span = spans::session(&session_id, &config.model);
    process_file(input, output, &config, &cli.removal_options())
        .instrument(span)
        .await
}

#[cfg(feature = "onnx")]
async fn process_file(
    input: &Path,
    output: &Path,
    config: &RemovalConfig,
    options: &RemovalOptions,
) -> Result<()> {
    use crate::{processor::RemovalSession, utils::ImagePreprocessor};
    use image::{DynamicImage, ImageFormat};
    use instant::Instant;

    let start_time = Instant::now();

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read input file {}", input.display()))?;
    let image = ImagePreprocessor::decode(&bytes)
        .with_context(|| format!("Failed to decode image {}", input.display()))?;

    let session = RemovalSession::from_config(config)
        .await
        .with_context(|| format!("Failed to create session for model '{}'", config.model))?;
    tracing::info!(
        "Model '{}' loaded on {} backend",
        session.descriptor().name(),
        session.backend_name()
    );

    let result = session
        .remove(&image, options)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    let format = ImageFormat::from_path(output).unwrap_or(ImageFormat::Png);
    let result = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(result.to_rgb8())
    } else {
        result
    };
    result
        .save_with_format(output, format)
        .with_context(|| format!("Failed to write output file {}", output.display()))?;

    println!(
        "✅ Processed {} -> {} in {:.2}s",
        input.display(),
        output.display(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

#[cfg(not(feature = "onnx"))]
async fn process_file(
    _input: &Path,
    _output: &Path,
    _config: &RemovalConfig,
    _options: &RemovalOptions,
) -> Result<()> {
    anyhow::bail!("Image processing requires the 'onnx' feature")
}

fn open_cache(cache_dir: Option<&Path>) -> Result<ModelCache> {
    match cache_dir {
        Some(dir) => ModelCache::with_dir(dir)
            .with_context(|| format!("Failed to open cache directory {}", dir.display())),
        None => ModelCache::new().context("Failed to open model cache"),
    }
}

#[cfg(feature = "onnx")]
fn show_provider_diagnostics() {
    use crate::backends::OnnxBackend;

    println!("🔧 Execution Providers");
    for (name, available, description) in OnnxBackend::list_providers() {
        let status = if available { "✅" } else { "❌" };
        println!("  {status} {name:<8} {description}");
    }
}

#[cfg(not(feature = "onnx"))]
fn show_provider_diagnostics() {
    println!("🔧 Execution Providers");
    println!("  ❌ ONNX Runtime support not compiled in (enable the 'onnx' feature)");
}

fn list_models(cache_dir: Option<&Path>) -> Result<()> {
    let cache = open_cache(cache_dir)?;
    let registry = ModelRegistry::builtin();

    println!("📦 Models");
    for descriptor in registry.iter() {
        let [width, height] = descriptor.preprocessing().target_size;
        if cache.is_model_cached(descriptor) {
            let size = std::fs::metadata(cache.model_path(descriptor))
                .map(|m| format_size(m.len()))
                .unwrap_or_default();
            println!("  ✅ {:<18} {width}x{height}  cached ({size})", descriptor.name());
        } else {
            println!("  ⬇️  {:<18} {width}x{height}  not downloaded", descriptor.name());
        }
    }

    let extra: Vec<_> = cache
        .list_cached_models()
        .context("Failed to list cached models")?
        .into_iter()
        .filter(|info| registry.get(&info.name).is_err())
        .collect();
    if !extra.is_empty() {
        println!("\n📁 Other files in cache:");
        for info in extra {
            println!("  • {} ({})", info.name, format_size(info.size_bytes));
        }
    }

    println!("\n   Cache location: {}", cache.dir().display());
    Ok(())
}

fn show_current_cache_dir(cache_dir: Option<&Path>) -> Result<()> {
    let cache = open_cache(cache_dir)?;

    println!("📁 Current cache directory:");
    println!("   Path: {}", cache.dir().display());

    let source = if cache_dir.is_some() {
        "--cache-dir flag".to_string()
    } else if std::env::var_os(CACHE_HOME_ENV).is_some_and(|v| !v.is_empty()) {
        format!("{CACHE_HOME_ENV} environment variable")
    } else {
        "home directory default".to_string()
    };
    println!("   Source: {source}");

    println!("\n💡 To use a custom cache directory:");
    println!("   bgremove --cache-dir /path/to/custom/cache");
    println!("   or set {CACHE_HOME_ENV} environment variable");
    Ok(())
}

fn clear_cache_models(cli: &Cli, model: Option<&str>) -> Result<()> {
    let cache = open_cache(cli.session.cache_dir.as_deref())?;

    if let Some(model) = model {
        let descriptor = ModelRegistry::builtin()
            .get(model)
            .with_context(|| format!("Unknown model '{model}'"))?;

        println!("🗑️  Clearing model: {model}");
        if cache
            .clear_model(&descriptor)
            .with_context(|| format!("Failed to clear model '{model}'"))?
        {
            println!("✅ Removed {}", cache.model_path(&descriptor).display());
        } else {
            println!("⚠️  Model '{model}' not found in cache");
        }
    } else {
        println!("🗑️  Clearing entire model cache...");
        let removed = cache.clear_all().context("Failed to clear cache")?;
        if removed.is_empty() {
            println!("💡 Cache was already empty");
        } else {
            println!("✅ Removed {} model(s):", removed.len());
            for name in &removed {
                println!("   • {name}");
            }
        }
    }

    println!("   Cache location: {}", cache.dir().display());
    Ok(())
}

async fn download_model_only(config: &RemovalConfig) -> Result<()> {
    let descriptor = ModelRegistry::builtin()
        .get(&config.model)?
        .with_checksum_enabled(config.verify_checksums);
    let cache = open_cache(config.cache_dir.as_deref())?;
    let destination = cache.model_path(&descriptor);

    println!("📦 Downloading model '{}' from: {}", descriptor.name(), descriptor.url());

    let downloader = ModelDownloader::with_cache(cache)
        .context("Failed to create model downloader")?
        .with_progress(config.show_progress);
    let path = downloader
        .download_model(&descriptor)
        .instrument(spans::download(descriptor.url(), &destination))
        .await
        .with_context(|| format!("Failed to download model '{}'", descriptor.name()))?;

    println!("✅ Model ready: {}", path.display());
    println!("\n💡 To use this model:");
    println!("   bgremove --model {} input.jpg output.png", descriptor.name());
    Ok(())
}
