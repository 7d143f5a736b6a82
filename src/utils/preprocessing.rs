//! Image normalization before inference
//!
//! Turns a decoded image into the `1×3×H×W` float tensor a segmentation model
//! expects: RGB conversion, exact Lanczos3 resize to the model input size,
//! scaling into `[0, 1]`, then per-channel `(v - mean) / std`.

use crate::{
    error::{RemovalError, Result},
    models::{PixelScaling, PreprocessingConfig},
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Largest accepted width or height of an input image
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Floor for the peak value when scaling by the brightest channel
const PEAK_FLOOR: f32 = 1e-6;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Decode an encoded image (PNG, JPEG, ...) from memory
    ///
    /// # Errors
    /// - Empty input
    /// - Unrecognized or malformed image data
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(RemovalError::invalid_input("Image data is empty"));
        }
        Ok(image::load_from_memory(bytes)?)
    }

    /// Reject images the pipeline cannot process
    ///
    /// # Errors
    /// - Zero width or height
    /// - Width or height above [`MAX_IMAGE_DIMENSION`]
    pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RemovalError::invalid_input(format!(
                "Image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
            return Err(RemovalError::invalid_input(format!(
                "Image dimensions too large: {width}x{height}. Maximum: {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION}"
            )));
        }
        Ok(())
    }

    /// Normalize an image into an NCHW tensor, dividing pixel values by 255
    ///
    /// `target_size` is `(width, height)`. The result always has shape
    /// `1×3×height×width` with channels in R, G, B order.
    ///
    /// # Errors
    /// - Zero-sized input image or target size
    pub fn normalize(
        image: &DynamicImage,
        target_size: (u32, u32),
        mean: [f32; 3],
        std: [f32; 3],
    ) -> Result<Array4<f32>> {
        Self::normalize_with_scaling(image, target_size, mean, std, PixelScaling::UnitRange)
    }

    /// Normalize an image into an NCHW tensor with an explicit pixel scaling mode
    ///
    /// # Errors
    /// - Zero-sized input image or target size
    pub fn normalize_with_scaling(
        image: &DynamicImage,
        target_size: (u32, u32),
        mean: [f32; 3],
        std: [f32; 3],
        scaling: PixelScaling,
    ) -> Result<Array4<f32>> {
        Self::validate_dimensions(image.width(), image.height())?;

        let (target_width, target_height) = target_size;
        if target_width == 0 || target_height == 0 {
            return Err(RemovalError::invalid_config(format!(
                "Target size must be non-zero, got {target_width}x{target_height}"
            )));
        }

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_width,
            target_height,
            FilterType::Lanczos3,
        );

        let divisor = match scaling {
            PixelScaling::UnitRange => 255.0,
            PixelScaling::PeakNormalized => {
                let peak = resized.as_raw().iter().copied().max().unwrap_or(0);
                f32::from(peak).max(PEAK_FLOOR)
            },
        };

        Ok(Self::rgb_to_tensor(&resized, divisor, mean, std))
    }

    /// Normalize an image with the preprocessing parameters of a model
    ///
    /// # Errors
    /// - Zero-sized input image
    /// - Invalid preprocessing parameters
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        preprocessing_config.validate()?;
        let [width, height] = preprocessing_config.target_size;

        Self::normalize_with_scaling(
            image,
            (width, height),
            preprocessing_config.normalization_mean,
            preprocessing_config.normalization_std,
            preprocessing_config.pixel_scaling,
        )
    }

    fn rgb_to_tensor(image: &RgbImage, divisor: f32, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match the image size
        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (f32::from(pixel[c]) / divisor - mean[c]) / std[c];
            }
        }

        tensor
    }
}
