//! Inference backend abstraction

use crate::error::Result;
use ndarray::{Array4, ArrayD};
use std::sync::Arc;

/// A loaded model that maps a normalized input tensor to its raw outputs
///
/// Implementations are read-only after construction and shared between
/// concurrent requests, hence the `Send + Sync` bound and `&self` receiver.
pub trait InferenceBackend: Send + Sync {
    /// Run inference on a `1×3×H×W` input tensor
    ///
    /// Returns every model output in declaration order. Callers interpret the
    /// first output as the confidence map.
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        (**self).infer(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Arc<T> {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        (**self).infer(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{ConstantBackend, FailingBackend};

    #[test]
    fn test_backend_trait_objects() {
        let backends: Vec<Box<dyn InferenceBackend>> = vec![
            Box::new(ConstantBackend::new((1, 1, 8, 8), 0.5)),
            Box::new(FailingBackend::new("boom")),
        ];

        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        let outputs = backends[0].infer(&input).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].shape(), &[1, 1, 8, 8]);

        assert!(backends[1].infer(&input).is_err());
        assert_eq!(backends[1].name(), "failing");
    }

    #[test]
    fn test_shared_backend_records_calls() {
        let backend = Arc::new(ConstantBackend::new((1, 1, 4, 4), 1.0));
        let shared: Box<dyn InferenceBackend> = Box::new(Arc::clone(&backend));

        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        shared.infer(&input).unwrap();
        shared.infer(&input).unwrap();

        assert_eq!(backend.call_count(), 2);
        assert_eq!(shared.name(), "constant");
    }
}
