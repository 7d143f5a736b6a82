//! Mock backends for testing the pipeline without model files
//!
//! These implement [`InferenceBackend`] so sessions, postprocessing and the HTTP
//! adapter can be exercised without ONNX Runtime or a downloaded model.

use crate::{
    error::{RemovalError, Result},
    inference::InferenceBackend,
};
use ndarray::{Array4, ArrayD};
use std::sync::Mutex;

/// Backend returning a tensor filled with one value
#[derive(Debug)]
pub struct ConstantBackend {
    output_shape: (usize, usize, usize, usize),
    value: f32,
    /// Input shapes seen, in call order
    call_history: Mutex<Vec<Vec<usize>>>,
}

impl ConstantBackend {
    #[must_use]
    pub fn new(output_shape: (usize, usize, usize, usize), value: f32) -> Self {
        Self {
            output_shape,
            value,
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn input_shapes(&self) -> Vec<Vec<usize>> {
        self.call_history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl InferenceBackend for ConstantBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(input.shape().to_vec());
        }
        Ok(vec![
            Array4::from_elem(self.output_shape, self.value).into_dyn()
        ])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Backend returning pre-built outputs verbatim
#[derive(Debug)]
pub struct FixedOutputBackend {
    outputs: Vec<ArrayD<f32>>,
}

impl FixedOutputBackend {
    #[must_use]
    pub fn new(outputs: Vec<ArrayD<f32>>) -> Self {
        Self { outputs }
    }
}

impl InferenceBackend for FixedOutputBackend {
    fn infer(&self, _input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        Ok(self.outputs.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Backend producing a soft circular foreground at the input resolution
#[derive(Debug, Default)]
pub struct CircleBackend;

impl InferenceBackend for CircleBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let (_, _, height, width) = input.dim();
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        let output = Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            ((radius - distance) / radius).clamp(0.0, 1.0)
        });

        Ok(vec![output.into_dyn()])
    }

    fn name(&self) -> &str {
        "circle"
    }
}

/// Backend whose inference always fails
#[derive(Debug)]
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    #[must_use]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl InferenceBackend for FailingBackend {
    fn infer(&self, _input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        Err(RemovalError::inference(self.message.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_backend_records_input_shapes() {
        let backend = ConstantBackend::new((1, 1, 4, 4), 0.25);
        let input = Array4::<f32>::zeros((1, 3, 16, 16));

        let outputs = backend.infer(&input).unwrap();
        assert!(outputs[0].iter().all(|&v| (v - 0.25).abs() < f32::EPSILON));
        assert_eq!(backend.input_shapes(), vec![vec![1, 3, 16, 16]]);
    }

    #[test]
    fn test_circle_backend_center_is_foreground() {
        let input = Array4::<f32>::zeros((1, 3, 30, 30));
        let outputs = CircleBackend.infer(&input).unwrap();
        let map = &outputs[0];

        assert_eq!(map.shape(), &[1, 1, 30, 30]);
        assert!(map[[0, 0, 15, 15]] > 0.9);
        assert!(map[[0, 0, 0, 0]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_failing_backend_reports_inference_error() {
        let err = FailingBackend::new("device lost")
            .infer(&Array4::zeros((1, 3, 2, 2)))
            .unwrap_err();
        assert!(matches!(err, RemovalError::Inference(_)));
        assert!(err.to_string().contains("device lost"));
    }
}
