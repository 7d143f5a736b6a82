//! Mask generation from raw model output
//!
//! The first model output is read as an `N×C×H×W` tensor with `N == 1`. Its
//! channel 0 is the confidence map, which is min-max rescaled to `[0, 1]`,
//! quantized to 8 bits and resized back to the original image size.

use crate::{
    error::{RemovalError, Result},
    types::SegmentationMask,
};
use image::{imageops::FilterType, GrayImage};
use ndarray::{Array2, ArrayD, Axis, Ix4};

/// Converts raw model outputs into alpha masks
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Extract the `H×W` confidence map from the first model output
    ///
    /// # Errors
    /// - No outputs, or the first output is not `1×C×H×W` with `C >= 1`
    /// - The confidence map contains NaN or infinite values
    pub fn confidence_map(outputs: &[ArrayD<f32>]) -> Result<Array2<f32>> {
        let first = outputs
            .first()
            .ok_or_else(|| RemovalError::shape_mismatch("at least one model output", "none"))?;

        let expected = "rank 4 [1, C>=1, H>=1, W>=1]";
        let tensor = first
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| RemovalError::shape_mismatch(expected, first.shape()))?;

        let (batch, channels, height, width) = tensor.dim();
        if batch != 1 || channels == 0 || height == 0 || width == 0 {
            return Err(RemovalError::shape_mismatch(expected, first.shape()));
        }

        let map = tensor
            .index_axis(Axis(0), 0)
            .index_axis(Axis(0), 0)
            .to_owned();

        let non_finite = map.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            return Err(RemovalError::NonFiniteOutput { count: non_finite });
        }

        Ok(map)
    }

    /// Min-max rescale a confidence map to `[0, 1]`
    ///
    /// A constant map has no range to stretch and becomes all zeros.
    #[must_use]
    pub fn rescale(map: &Array2<f32>) -> Array2<f32> {
        let (min, max) = map
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let range = max - min;
        if range <= 0.0 || !range.is_finite() {
            return Array2::zeros(map.raw_dim());
        }

        map.mapv(|v| (v - min) / range)
    }

    /// Turn raw model outputs into a mask of the original image size
    ///
    /// `original_dimensions` is `(width, height)`.
    ///
    /// # Errors
    /// - Any failure reported by [`Self::confidence_map`]
    /// - Zero-sized original dimensions
    pub fn to_mask(
        outputs: &[ArrayD<f32>],
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (orig_width, orig_height) = original_dimensions;
        if orig_width == 0 || orig_height == 0 {
            return Err(RemovalError::invalid_input(format!(
                "Original dimensions must be non-zero, got {orig_width}x{orig_height}"
            )));
        }

        let rescaled = Self::rescale(&Self::confidence_map(outputs)?);
        let (height, width) = rescaled.dim();

        // Truncation, not rounding
        let data: Vec<u8> = rescaled.iter().map(|&v| (v * 255.0) as u8).collect();

        let model_mask = GrayImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            RemovalError::internal(format!("Failed to build {width}x{height} mask image"))
        })?;

        tracing::debug!(
            model_width = width,
            model_height = height,
            orig_width,
            orig_height,
            "resizing mask to original dimensions"
        );

        let resized = if (width as u32, height as u32) == original_dimensions {
            model_mask
        } else {
            image::imageops::resize(&model_mask, orig_width, orig_height, FilterType::Lanczos3)
        };

        Ok(SegmentationMask::from_image(&resized))
    }
}
