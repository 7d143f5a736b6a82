//! ONNX Runtime backend
//!
//! Loads a model file into an `ort` session, picks an execution provider with
//! availability checks and CPU fallback, and runs positional inputs.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{RemovalError, Result};
use crate::inference::InferenceBackend;
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// ONNX Runtime backend for a single loaded model
#[derive(Debug)]
pub struct OnnxBackend {
    // `Session::run` needs exclusive access
    session: Mutex<Session>,
    name: String,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability and a description
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 Checking execution provider availability");

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Load a model file using the provider and threading settings of `config`
    ///
    /// # Errors
    /// - The model file cannot be read or is not a valid ONNX graph
    /// - ONNX Runtime rejects the session configuration
    pub fn load<P: AsRef<Path>>(model_path: P, config: &RemovalConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_start = Instant::now();

        let suggestions = [
            "verify the file is a complete ONNX model",
            "clear the model cache and download again",
        ];

        let mut builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| {
                RemovalError::model_error_with_context(
                    "configure session for",
                    model_path,
                    &e.to_string(),
                    &[],
                )
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                RemovalError::inference(format!(
                    "Failed to set {} execution provider: {e}",
                    config.execution_provider
                ))
            })?;
        }

        let intra_threads = resolve_intra_threads(config.intra_threads);

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| RemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                RemovalError::model_error_with_context(
                    "load",
                    model_path,
                    &e.to_string(),
                    &suggestions,
                )
            })?;

        let name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        log::debug!("Session configuration:");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Intra-op threads: {intra_threads}");
        log::debug!("  - Optimization level: Level3");
        log::info!(
            "📊 Model '{}' loaded in {:.0}ms",
            name,
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
            name,
        })
    }

    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = || {
            let provider = CUDAExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| provider.build())
        };
        let coreml = || {
            let provider = CoreMLExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| provider.with_subgraphs(true).build())
        };

        match requested {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Auto => {
                let providers: Vec<_> = [cuda(), coreml()].into_iter().flatten().collect();
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                } else {
                    log::info!(
                        "✅ Hardware acceleration enabled with {} provider(s)",
                        providers.len()
                    );
                }
                providers
            },
            ExecutionProvider::Cuda => cuda().map_or_else(
                || {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| {
                    log::info!("🚀 Using CUDA execution provider");
                    vec![p]
                },
            ),
            ExecutionProvider::CoreMl => coreml().map_or_else(
                || {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| {
                    log::info!("🍎 Using CoreML execution provider");
                    vec![p]
                },
            ),
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| RemovalError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| RemovalError::internal("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| RemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let core_inference_time = inference_start.elapsed();

        let keys: Vec<String> = outputs.keys().map(ToString::to_string).collect();
        if keys.is_empty() {
            return Err(RemovalError::inference("Model produced no outputs"));
        }

        let mut results = Vec::with_capacity(keys.len());
        for key in &keys {
            let array = outputs
                .get(key.as_str())
                .ok_or_else(|| RemovalError::inference(format!("Output '{key}' not found")))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    RemovalError::inference(format!("Failed to extract output '{key}': {e}"))
                })?
                .to_owned();
            results.push(array);
        }

        log::debug!(
            "  ⚡ Core inference: {:.2}ms, {} output(s), first output {:?}",
            core_inference_time.as_secs_f64() * 1000.0,
            results.len(),
            results.first().map(ArrayD::shape)
        );

        Ok(results)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Zero means one thread per available core, falling back to 4
fn resolve_intra_threads(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
    }
}
