// src/error.rs

use thiserror::Error;

/// Failure taxonomy for a pipeline run.
///
/// Per-frame and per-unit failures are absorbed where they occur and never
/// surface here; only resource acquisition problems and voluntary
/// cancellation end a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Video file does not exist at the given path.
    #[error("video not found: {0}")]
    VideoNotFound(String),

    /// Video file exists but is zero bytes.
    #[error("video file is empty: {0}")]
    VideoEmpty(String),

    /// Container could not be opened by the decoder backend.
    #[error("failed to open video: {0}")]
    VideoOpen(String),

    /// No classifier is loaded; no unit could ever be scored.
    #[error("classifier not loaded")]
    ClassifierUnavailable,

    /// Built tensor does not match the classifier's declared input shape.
    #[error("tensor shape mismatch: {0}")]
    TensorShapeMismatch(String),

    /// Classifier call failed for one unit.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The run was cancelled cooperatively. Not a failure: a distinct
    /// terminal outcome with no result produced.
    #[error("analysis cancelled")]
    Cancelled,
}

impl From<ort::Error> for PipelineError {
    fn from(err: ort::Error) -> Self {
        PipelineError::Inference(err.to_string())
    }
}
