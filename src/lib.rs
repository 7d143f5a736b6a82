#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal Service
//!
//! Salient-object segmentation models (`rmbg14`, `u2net`, `u2netp`,
//! `isnet-general-use`) run through ONNX Runtime, exposed as a library, an
//! HTTP endpoint and a command-line tool.
//!
//! The pipeline for one image:
//!
//! 1. [`ImagePreprocessor`] resizes the image to the model's input size and
//!    normalizes it into a `1×3×H×W` tensor.
//! 2. An [`InferenceBackend`] runs the model.
//! 3. [`MaskPostprocessor`] min-max rescales the first output's channel 0 and
//!    resizes it back into a [`SegmentationMask`] at the original size.
//! 4. [`RemovalSession::remove`] turns the mask into an RGBA cutout, a
//!    composited image or the mask itself.
//!
//! Model files are fetched once into `$U2NET_HOME` (or `~/.u2net`) by
//! [`ModelDownloader`] and verified with SHA-256 when a digest is known.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_service::{RemovalConfig, RemovalOptions, RemovalSession};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().model("u2netp").build()?;
//! let session = RemovalSession::from_config(&config).await?;
//!
//! let input = std::fs::read("input.jpg")?;
//! let png = session.remove_bytes(&input, &RemovalOptions::default())?;
//! std::fs::write("output.png", png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom backends
//!
//! Anything implementing [`InferenceBackend`] can drive a session, which is how
//! the tests run the pipeline without a model file:
//!
//! ```rust
//! use bgremove_service::{InferenceBackend, ModelRegistry, RemovalSession, Result};
//! use ndarray::{Array4, ArrayD, IxDyn};
//!
//! struct Uniform;
//!
//! impl InferenceBackend for Uniform {
//!     fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
//!         let (_, _, h, w) = input.dim();
//!         Ok(vec![ArrayD::from_elem(IxDyn(&[1, 1, h, w]), 0.5)])
//!     }
//!
//!     fn name(&self) -> &str {
//!         "uniform"
//!     }
//! }
//!
//! let descriptor = ModelRegistry::builtin().get("u2netp")?;
//! let session = RemovalSession::new(descriptor, Uniform)?;
//! let mask = session.predict(&image::DynamicImage::new_rgb8(100, 150))?;
//! assert_eq!(mask.dimensions, (100, 150));
//! # Ok::<(), bgremove_service::RemovalError>(())
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `server` (default): axum HTTP adapter (`POST /api/remove`, `GET /health`)
//! - `cli` (default): command-line binaries, progress bars and subscriber setup
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log output

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{
    BackgroundColor, ExecutionProvider, RemovalConfig, RemovalConfigBuilder, RemovalOptions,
    ServerConfig,
};
pub use download::{sha256_file, ModelDownloader};
pub use error::{RemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelDescriptor, ModelRegistry, PixelScaling, PreprocessingConfig};
pub use processor::{encode_png, RemovalSession};
pub use types::SegmentationMask;
pub use utils::{ImagePreprocessor, MaskPostprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{spans, TracingConfig, TracingFormat};
