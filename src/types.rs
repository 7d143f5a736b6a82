//! Mask and cutout types

use crate::config::BackgroundColor;
use crate::error::{RemovalError, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Single-channel 8-bit alpha mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Mask value at `(x, y)`, if inside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        let (width, height) = self.dimensions;
        if x >= width || y >= height {
            return None;
        }
        let index = y as usize * width as usize + x as usize;
        self.data.get(index).copied()
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        ImageBuffer::<Luma<u8>, _>::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            RemovalError::internal(format!(
                "Mask data length {} does not match {}x{}",
                self.data.len(),
                width,
                height
            ))
        })
    }

    /// Cut out `image` using the mask as its alpha channel
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn apply_to_image(&self, image: &DynamicImage) -> Result<RgbaImage> {
        if image.width() != self.width() || image.height() != self.height() {
            return Err(RemovalError::shape_mismatch(
                format!("image of {}x{}", self.width(), self.height()),
                (image.width(), image.height()),
            ));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, &alpha) in rgba.pixels_mut().zip(self.data.iter()) {
            pixel[3] = alpha;
        }
        Ok(rgba)
    }

    /// Cut out `image` and composite the result over a solid color
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn composite_onto(
        &self,
        image: &DynamicImage,
        background: BackgroundColor,
    ) -> Result<RgbaImage> {
        let mut cutout = self.apply_to_image(image)?;
        for pixel in cutout.pixels_mut() {
            *pixel = alpha_over(*pixel, background.to_rgba());
        }
        Ok(cutout)
    }
}

/// Porter-Duff "over": `src` drawn on top of `dst`
fn alpha_over(src: Rgba<u8>, dst: [u8; 4]) -> Rgba<u8> {
    let src_a = f32::from(src[3]) / 255.0;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let value = (f32::from(src[i]) * src_a + f32::from(dst[i]) * dst_a * (1.0 - src_a)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn half_mask(width: u32, height: u32) -> SegmentationMask {
        let data = (0..height)
            .flat_map(|_| (0..width).map(move |x| if x < width / 2 { 0 } else { 255 }))
            .collect();
        SegmentationMask::new(data, (width, height))
    }

    #[test]
    fn test_to_image_and_get() {
        let mask = half_mask(4, 2);
        let image = mask.to_image().unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(mask.get(0, 1), Some(0));
        assert_eq!(mask.get(3, 1), Some(255));
        assert_eq!(mask.get(4, 0), None);

        let broken = SegmentationMask::new(vec![0; 3], (2, 2));
        assert!(broken.to_image().is_err());
    }

    #[test]
    fn test_apply_to_image_sets_alpha() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([10, 20, 30])));
        let cutout = half_mask(4, 2).apply_to_image(&image).unwrap();

        assert_eq!(cutout.get_pixel(0, 0), &Rgba([10, 20, 30, 0]));
        assert_eq!(cutout.get_pixel(3, 1), &Rgba([10, 20, 30, 255]));

        let wrong = DynamicImage::ImageRgb8(RgbImage::new(3, 2));
        assert!(matches!(
            half_mask(4, 2).apply_to_image(&wrong).unwrap_err(),
            RemovalError::ShapeMismatch { .. }
        ));
    }

    #[test]
    fn test_composite_onto_background() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 1, Rgb([200, 0, 0])));
        let white = BackgroundColor::new(255, 255, 255, 255);
        let out = half_mask(4, 1).composite_onto(&image, white).unwrap();

        // Transparent pixels show the background, opaque ones the image
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(3, 0), &Rgba([200, 0, 0, 255]));
    }

    #[test]
    fn test_alpha_over_half_transparent() {
        let out = alpha_over(Rgba([0, 0, 0, 128]), [255, 255, 255, 255]);
        assert_eq!(out[3], 255);
        assert!((i32::from(out[0]) - 127).abs() <= 1);
        assert_eq!(alpha_over(Rgba([9, 9, 9, 0]), [0, 0, 0, 0]), Rgba([0, 0, 0, 0]));
    }
}
