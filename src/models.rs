//! Model descriptors and the declarative model registry
//!
//! Every supported model variant is one row in [`BUILTIN_MODELS`]: its name, the
//! fixed download URL, an optional SHA-256 digest and the preprocessing the
//! network was trained with. Adding a variant means adding a row, not code.

use crate::error::{RemovalError, Result};
use serde::{Deserialize, Serialize};

/// Name of the model used when nothing else is configured
pub const DEFAULT_MODEL_NAME: &str = "rmbg14";

/// How 8-bit pixel values are brought into `[0, 1]` before mean/std scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelScaling {
    /// Divide by 255
    #[default]
    UnitRange,
    /// Divide by the brightest channel value found in the resized image
    PeakNormalized,
}

/// Preprocessing parameters a model was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size as `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean (R, G, B)
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation (R, G, B)
    pub normalization_std: [f32; 3],
    #[serde(default)]
    pub pixel_scaling: PixelScaling,
}

impl PreprocessingConfig {
    /// Input tensor shape in NCHW order
    #[must_use]
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        (
            1,
            3,
            self.target_size[1] as usize,
            self.target_size[0] as usize,
        )
    }

    /// Check that the parameters can produce a usable tensor
    ///
    /// # Errors
    /// - Zero-sized target
    /// - Zero, negative or non-finite standard deviation
    pub fn validate(&self) -> Result<()> {
        if self.target_size.contains(&0) {
            return Err(RemovalError::invalid_config(format!(
                "Target size must be non-zero, got {}x{}",
                self.target_size[0], self.target_size[1]
            )));
        }
        if self
            .normalization_std
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(RemovalError::invalid_config(format!(
                "Normalization std must be positive and finite, got {:?}",
                self.normalization_std
            )));
        }
        if self.normalization_mean.iter().any(|m| !m.is_finite()) {
            return Err(RemovalError::invalid_config(format!(
                "Normalization mean must be finite, got {:?}",
                self.normalization_mean
            )));
        }
        Ok(())
    }
}

/// Everything needed to fetch, verify and feed one model variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    name: String,
    url: String,
    sha256: Option<String>,
    checksum_enabled: bool,
    preprocessing: PreprocessingConfig,
}

impl ModelDescriptor {
    /// Describe a model that is not part of the built-in table
    #[must_use]
    pub fn new<N: Into<String>, U: Into<String>>(
        name: N,
        url: U,
        preprocessing: PreprocessingConfig,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sha256: None,
            checksum_enabled: true,
            preprocessing,
        }
    }

    /// Attach the expected SHA-256 digest (lowercase hex) of the artifact
    #[must_use]
    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    /// Enable or disable integrity verification
    #[must_use]
    pub fn with_checksum_enabled(mut self, enabled: bool) -> Self {
        self.checksum_enabled = enabled;
        self
    }

    /// Stable identifier of this model variant
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed remote location of the artifact
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Expected SHA-256 digest, when one is published
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Whether integrity verification of the cached artifact is performed
    #[must_use]
    pub fn checksum_enabled(&self) -> bool {
        self.checksum_enabled
    }

    /// Digest to verify against, if verification is on and a digest is known
    #[must_use]
    pub fn expected_digest(&self) -> Option<&str> {
        if self.checksum_enabled {
            self.sha256()
        } else {
            None
        }
    }

    /// File name of the cached artifact (`{name}.onnx`)
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.name)
    }

    #[must_use]
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }
}

struct ModelEntry {
    name: &'static str,
    url: &'static str,
    sha256: Option<&'static str>,
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    scaling: PixelScaling,
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Built-in model table
const BUILTIN_MODELS: &[ModelEntry] = &[
    ModelEntry {
        name: "rmbg14",
        url: "https://huggingface.co/briaai/RMBG-1.4/resolve/main/onnx/model.onnx",
        sha256: None,
        size: 1024,
        mean: [0.5, 0.5, 0.5],
        std: [1.0, 1.0, 1.0],
        scaling: PixelScaling::PeakNormalized,
    },
    ModelEntry {
        name: "u2net",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx",
        sha256: None,
        size: 320,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
        scaling: PixelScaling::PeakNormalized,
    },
    ModelEntry {
        name: "u2netp",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx",
        sha256: None,
        size: 320,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
        scaling: PixelScaling::PeakNormalized,
    },
    ModelEntry {
        name: "isnet-general-use",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/isnet-general-use.onnx",
        sha256: None,
        size: 1024,
        mean: [0.5, 0.5, 0.5],
        std: [1.0, 1.0, 1.0],
        scaling: PixelScaling::PeakNormalized,
    },
];

impl From<&ModelEntry> for ModelDescriptor {
    fn from(entry: &ModelEntry) -> Self {
        let descriptor = ModelDescriptor::new(
            entry.name,
            entry.url,
            PreprocessingConfig {
                target_size: [entry.size, entry.size],
                normalization_mean: entry.mean,
                normalization_std: entry.std,
                pixel_scaling: entry.scaling,
            },
        );
        match entry.sha256 {
            Some(digest) => descriptor.with_sha256(digest),
            None => descriptor,
        }
    }
}

/// Lookup table from model name to descriptor
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Registry holding the built-in model table
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            models: BUILTIN_MODELS.iter().map(ModelDescriptor::from).collect(),
        }
    }

    /// Empty registry, for callers that only serve their own models
    #[must_use]
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }

    /// Add a descriptor, replacing any existing entry with the same name
    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.models.retain(|m| m.name() != descriptor.name());
        self.models.push(descriptor);
    }

    /// Resolve a model name
    ///
    /// # Errors
    /// - Unknown model name
    pub fn get(&self, name: &str) -> Result<ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| {
                RemovalError::invalid_config(format!(
                    "Unknown model '{name}'. Available models: {}",
                    self.names().join(", ")
                ))
            })
    }

    /// Names of all registered models, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(ModelDescriptor::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
