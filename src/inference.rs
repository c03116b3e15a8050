// src/inference.rs

use crate::preprocessing::{Tensor, TensorShape};
use crate::types::ModelConfig;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info, warn};

/// Black-box scoring contract: fixed-shape tensor in, raw score vector out.
///
/// The call must be free of side effects for a tensor of the declared shape;
/// anything else fails with an error the pipeline treats as a per-unit
/// failure, never a run failure.
pub trait Classifier {
    fn num_classes(&self) -> usize;
    fn score(&mut self, tensor: &Tensor) -> Result<Vec<f32>>;
}

/// ONNX Runtime implementation of the classifier contract.
pub struct OnnxClassifier {
    session: Session,
    num_classes: usize,
}

impl OnnxClassifier {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        info!("Loading classifier: {}", config.path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(&config.path)
            .context("Failed to load model")?;

        let classifier = Self {
            session,
            num_classes: config.num_classes,
        };
        info!("✓ Classifier loaded ({} classes)", config.num_classes);
        Ok(classifier)
    }

    /// Throwaway inference against a mid-gray input to confirm the declared
    /// shape matches the model. Failure is logged, not fatal: the real run
    /// degrades per-unit anyway.
    fn warm_up(&mut self, config: &ModelConfig) {
        let shape = TensorShape::from_model(config);
        let tensor = Tensor {
            data: vec![0.0f32; shape.element_count()],
            shape,
        };
        match self.score(&tensor) {
            Ok(scores) => debug!("warm-up inference ok, {} scores", scores.len()),
            Err(e) => warn!("warm-up inference failed (shape {:?}): {}", shape, e),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn score(&mut self, tensor: &Tensor) -> Result<Vec<f32>> {
        let dims = tensor.shape.batched_dims();

        let input_value = ort::value::Value::from_array((
            dims.as_slice(),
            tensor.data.clone().into_boxed_slice(),
        ))?;

        let outputs = self.session.run(ort::inputs!["input" => input_value])?;

        let (_, data_slice) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data_slice.to_vec())
    }
}

/// Exclusively-owned classifier resource with an explicit load/unload
/// lifecycle, passed into each pipeline run. Scoring takes `&mut`, so
/// concurrent runs must serialize behind the caller's lock.
pub struct ClassifierHandle {
    inner: Option<Box<dyn Classifier>>,
}

impl ClassifierHandle {
    /// Load the ONNX model once, warm it up, and hand back a live handle.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let mut classifier = OnnxClassifier::new(config)?;
        classifier.warm_up(config);
        Ok(Self {
            inner: Some(Box::new(classifier)),
        })
    }

    /// A handle with nothing loaded. Runs against it fail fast with
    /// `ClassifierUnavailable`.
    pub fn unloaded() -> Self {
        Self { inner: None }
    }

    /// Wrap an arbitrary classifier implementation.
    pub fn from_classifier(classifier: Box<dyn Classifier>) -> Self {
        Self {
            inner: Some(classifier),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_some()
    }

    /// Release the model. The handle can be dropped or reloaded afterwards.
    pub fn unload(&mut self) {
        if self.inner.take().is_some() {
            info!("Classifier unloaded");
        }
    }

    pub fn classifier_mut(&mut self) -> Option<&mut dyn Classifier> {
        self.inner.as_deref_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstClassifier;

    impl Classifier for ConstClassifier {
        fn num_classes(&self) -> usize {
            8
        }
        fn score(&mut self, _tensor: &Tensor) -> Result<Vec<f32>> {
            Ok(vec![0.0; 8])
        }
    }

    #[test]
    fn test_handle_lifecycle() {
        let mut handle = ClassifierHandle::from_classifier(Box::new(ConstClassifier));
        assert!(handle.is_loaded());
        assert!(handle.classifier_mut().is_some());

        handle.unload();
        assert!(!handle.is_loaded());
        assert!(handle.classifier_mut().is_none());
    }

    #[test]
    fn test_unloaded_handle_has_no_classifier() {
        let mut handle = ClassifierHandle::unloaded();
        assert!(!handle.is_loaded());
        assert!(handle.classifier_mut().is_none());
    }
}
