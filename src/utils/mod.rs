//! Image pre- and postprocessing around model inference

pub mod postprocessing;
pub mod preprocessing;

pub use postprocessing::MaskPostprocessor;
pub use preprocessing::{ImagePreprocessor, MAX_IMAGE_DIMENSION};
