//! Background removal session
//!
//! A [`RemovalSession`] pairs one model descriptor with one loaded inference
//! backend. It is built once, then shared (typically behind an `Arc`) by every
//! request; each call runs normalizer, backend and postprocessor independently.

use crate::{
    config::RemovalOptions,
    error::{RemovalError, Result},
    inference::InferenceBackend,
    models::ModelDescriptor,
    tracing_config::spans,
    types::SegmentationMask,
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use image::DynamicImage;
use instant::Instant;
use std::io::Cursor;
use tracing::{debug, instrument};

#[cfg(feature = "onnx")]
use crate::{
    backends::OnnxBackend, cache::ModelCache, config::RemovalConfig, download::ModelDownloader,
    models::ModelRegistry,
};
#[cfg(feature = "onnx")]
use tracing::Instrument;

/// A loaded model ready to remove backgrounds
pub struct RemovalSession {
    descriptor: ModelDescriptor,
    backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for RemovalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalSession")
            .field("model", &self.descriptor.name())
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl RemovalSession {
    /// Create a session from a descriptor and any inference backend
    ///
    /// # Errors
    /// - Invalid preprocessing parameters in the descriptor
    pub fn new<B: InferenceBackend + 'static>(descriptor: ModelDescriptor, backend: B) -> Result<Self> {
        descriptor.preprocessing().validate()?;
        Ok(Self {
            descriptor,
            backend: Box::new(backend),
        })
    }

    /// Resolve the configured model, fetch it if needed and load it with ONNX Runtime
    ///
    /// # Errors
    /// - Invalid configuration or unknown model name
    /// - Download or checksum failures
    /// - ONNX Runtime failed to load the model
    #[cfg(feature = "onnx")]
    pub async fn from_config(config: &RemovalConfig) -> Result<Self> {
        Self::from_registry(config, &ModelRegistry::builtin()).await
    }

    /// Like [`Self::from_config`] but resolving names through a custom registry
    ///
    /// # Errors
    /// - Same as [`Self::from_config`]
    #[cfg(feature = "onnx")]
    pub async fn from_registry(config: &RemovalConfig, registry: &ModelRegistry) -> Result<Self> {
        config.validate()?;

        let descriptor = registry
            .get(&config.model)?
            .with_checksum_enabled(config.verify_checksums);

        let model_path = Self::ensure_model(config, &descriptor).await?;

        let load_config = config.clone();
        let path = model_path.clone();
        let span = spans::model_loading(descriptor.name(), &config.execution_provider.to_string());
        let backend = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            OnnxBackend::load(&path, &load_config)
        })
        .await
        .map_err(|e| RemovalError::internal(format!("Model loading task failed: {e}")))??;

        Self::new(descriptor, backend)
    }

    /// Make sure the artifact of `descriptor` is cached and return its path
    ///
    /// # Errors
    /// - Cache directory cannot be created
    /// - Download or checksum failures
    #[cfg(feature = "onnx")]
    pub async fn ensure_model(
        config: &RemovalConfig,
        descriptor: &ModelDescriptor,
    ) -> Result<std::path::PathBuf> {
        let cache = match &config.cache_dir {
            Some(dir) => ModelCache::with_dir(dir)?,
            None => ModelCache::new()?,
        };
        let destination = cache.model_path(descriptor);
        let downloader = ModelDownloader::with_cache(cache)?.with_progress(config.show_progress);

        downloader
            .download_model(descriptor)
            .instrument(spans::download(descriptor.url(), &destination))
            .await
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Predict the alpha mask of an image, at the image's own size
    ///
    /// # Errors
    /// - Zero-sized image
    /// - Inference failure
    /// - Model output with an unexpected shape or non-finite values
    #[instrument(
        skip(self, image),
        fields(
            model = %self.descriptor.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn predict(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let total_start = Instant::now();
        let original_dimensions = (image.width(), image.height());
        let preprocessing = self.descriptor.preprocessing();
        let target = (preprocessing.target_size[0], preprocessing.target_size[1]);

        let input = {
            let _span = spans::preprocessing(original_dimensions, target).entered();
            ImagePreprocessor::preprocess_for_inference(image, preprocessing)?
        };
        let preprocess_elapsed = total_start.elapsed();

        let outputs = {
            let _span = spans::inference(self.backend.name()).entered();
            self.backend.infer(&input)?
        };
        let inference_elapsed = total_start.elapsed() - preprocess_elapsed;

        let mask = {
            let _span = spans::postprocessing(original_dimensions).entered();
            MaskPostprocessor::to_mask(&outputs, original_dimensions)?
        };

        debug!(
            preprocessing_ms = preprocess_elapsed.as_millis() as u64,
            inference_ms = inference_elapsed.as_millis() as u64,
            total_ms = total_start.elapsed().as_millis() as u64,
            "mask predicted"
        );

        Ok(mask)
    }

    /// Remove the background of an image
    ///
    /// Returns the grayscale mask when `options.only_mask` is set, otherwise an
    /// RGBA cutout whose alpha is the mask, composited onto `options.background`
    /// when one is given.
    ///
    /// # Errors
    /// - Same as [`Self::predict`]
    pub fn remove(&self, image: &DynamicImage, options: &RemovalOptions) -> Result<DynamicImage> {
        let mask = self.predict(image)?;

        if options.only_mask {
            return Ok(DynamicImage::ImageLuma8(mask.to_image()?));
        }

        let cutout = match options.background {
            Some(color) => mask.composite_onto(image, color)?,
            None => mask.apply_to_image(image)?,
        };
        Ok(DynamicImage::ImageRgba8(cutout))
    }

    /// Decode an encoded image, remove its background and encode the result as PNG
    ///
    /// # Errors
    /// - Undecodable input
    /// - Same as [`Self::remove`]
    pub fn remove_bytes(&self, bytes: &[u8], options: &RemovalOptions) -> Result<Vec<u8>> {
        let image = ImagePreprocessor::decode(bytes)?;
        let result = self.remove(&image, options)?;
        encode_png(&result)
    }
}

/// Encode an image as PNG
///
/// # Errors
/// - Encoder failure
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| RemovalError::internal(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{CircleBackend, ConstantBackend, FailingBackend, FixedOutputBackend};
    use crate::config::BackgroundColor;
    use crate::models::{ModelRegistry, PixelScaling, PreprocessingConfig};
    use image::{GenericImageView, Rgb, RgbImage};
    use ndarray::{ArrayD, IxDyn};
    use std::sync::Arc;

    fn small_descriptor() -> ModelDescriptor {
        ModelDescriptor::new(
            "test",
            "http://127.0.0.1:9/test.onnx",
            PreprocessingConfig {
                target_size: [32, 32],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
                pixel_scaling: PixelScaling::UnitRange,
            },
        )
    }

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 120, 200])))
    }

    #[test]
    fn test_predict_feeds_model_input_size() {
        let backend = Arc::new(ConstantBackend::new((1, 1, 32, 32), 0.5));
        let session = RemovalSession::new(small_descriptor(), Arc::clone(&backend)).unwrap();

        let mask = session.predict(&create_test_image(100, 150)).unwrap();

        assert_eq!(mask.dimensions, (100, 150));
        assert!(mask.data.iter().all(|&v| v == 0));
        assert_eq!(backend.input_shapes(), vec![vec![1, 3, 32, 32]]);
    }

    #[test]
    fn test_builtin_descriptor_feeds_rmbg_input() {
        let backend = Arc::new(ConstantBackend::new((1, 1, 8, 8), 1.0));
        let descriptor = ModelRegistry::builtin().get("rmbg14").unwrap();
        let session = RemovalSession::new(descriptor, Arc::clone(&backend)).unwrap();

        session.predict(&create_test_image(10, 10)).unwrap();
        assert_eq!(backend.input_shapes(), vec![vec![1, 3, 1024, 1024]]);
    }

    #[test]
    fn test_remove_returns_rgba_cutout() {
        let session = RemovalSession::new(small_descriptor(), CircleBackend).unwrap();
        let image = create_test_image(64, 48);

        let result = session.remove(&image, &RemovalOptions::default()).unwrap();
        assert_eq!(result.dimensions(), (64, 48));
        let rgba = result.as_rgba8().unwrap();

        assert!(rgba.get_pixel(32, 24)[3] > 200);
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(&rgba.get_pixel(32, 24).0[..3], &[40, 120, 200]);
    }

    #[test]
    fn test_remove_only_mask_and_background() {
        let session = RemovalSession::new(small_descriptor(), CircleBackend).unwrap();
        let image = create_test_image(64, 48);

        let mask = session.remove(&image, &RemovalOptions::mask_only()).unwrap();
        assert!(mask.as_luma8().is_some());
        assert_eq!(mask.dimensions(), (64, 48));

        let options = RemovalOptions::default().with_background(BackgroundColor::new(0, 255, 0, 255));
        let composited = session.remove(&image, &options).unwrap();
        let rgba = composited.as_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_remove_bytes_produces_png() {
        let session = RemovalSession::new(small_descriptor(), CircleBackend).unwrap();
        let input = encode_png(&create_test_image(20, 10)).unwrap();

        let output = session.remove_bytes(&input, &RemovalOptions::default()).unwrap();
        assert_eq!(&output[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn test_errors_propagate() {
        let session = RemovalSession::new(small_descriptor(), FailingBackend::new("oom")).unwrap();
        assert!(matches!(
            session.predict(&create_test_image(4, 4)).unwrap_err(),
            RemovalError::Inference(_)
        ));

        let bad_shape = FixedOutputBackend::new(vec![ArrayD::zeros(IxDyn(&[1, 32, 32]))]);
        let session = RemovalSession::new(small_descriptor(), bad_shape).unwrap();
        assert!(matches!(
            session.predict(&create_test_image(4, 4)).unwrap_err(),
            RemovalError::ShapeMismatch { .. }
        ));

        let err = session
            .remove_bytes(b"garbage", &RemovalOptions::default())
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let mut config = small_descriptor().preprocessing().clone();
        config.normalization_std = [0.0, 1.0, 1.0];
        let descriptor = ModelDescriptor::new("bad", "http://127.0.0.1:9/bad.onnx", config);

        assert!(RemovalSession::new(descriptor, CircleBackend).is_err());
    }

    #[test]
    fn test_session_debug_names_model_and_backend() {
        let session = RemovalSession::new(small_descriptor(), CircleBackend).unwrap();
        let debug = format!("{session:?}");
        assert!(debug.contains("test"));
        assert!(debug.contains("circle"));
        assert_eq!(session.backend_name(), "circle");
        assert_eq!(session.descriptor().name(), "test");
    }
}
