use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub sampling: SamplingConfig,
    pub decision: DecisionConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub input_width: usize,
    pub input_height: usize,
    /// Frames fed to the classifier per sampling unit. 1 = single-frame mode.
    pub frames_per_unit: usize,
    pub num_classes: usize,
    pub normalization: Normalization,
    pub num_threads: usize,
}

/// Per-channel pixel normalization applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// (px/255 - mean[c]) / std[c] with the conventional ImageNet statistics.
    Imagenet,
    /// 1 - 2*(px/255), mapping into [-1, 1].
    Symmetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub unit_duration_ms: i64,
    pub stride_ms: i64,
    /// Substituted when the container carries no usable duration metadata.
    pub default_duration_ms: i64,
    /// Progress percent where extraction hands over to inference.
    pub progress_split: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub labels: Vec<String>,
    /// Class indices counted as emergencies. Fixed after construction.
    pub emergency_classes: Vec<usize>,
    /// Top-1 probability a unit must exceed to raise its emergency flag.
    pub per_unit_threshold: f32,
    /// Predictions kept per unit for aggregation.
    pub top_k: usize,
    /// Aggregate confidence the dominant class must exceed.
    pub confidence_threshold: f32,
    /// Fraction of emergency-flagged units that alone trips the verdict.
    pub ratio_threshold: f32,
}

impl DecisionConfig {
    pub fn is_emergency_class(&self, class_index: usize) -> bool {
        self.emergency_classes.contains(&class_index)
    }

    pub fn label_for(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_index))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// A decoded RGB24 frame. Transient: handed to the tensor builder and dropped.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

/// One ranked class for a single sampling unit.
#[derive(Debug, Clone, Serialize)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
    pub is_emergency: bool,
}

/// Per-unit outcome: top-K predictions plus the unit's emergency flag.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub predictions: Vec<ClassPrediction>,
    pub is_emergency: bool,
}

/// Final verdict for one video. Immutable once built; the sole output of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub is_emergency: bool,
    pub top_predictions: Vec<ClassPrediction>,
    pub confidence: f32,
    pub total_units: usize,
    pub emergency_units: usize,
    pub dominant_class: String,
}

impl AnalysisResult {
    /// The documented zero-valued result returned for unusable inputs.
    pub fn empty() -> Self {
        Self {
            is_emergency: false,
            top_predictions: Vec::new(),
            confidence: 0.0,
            total_units: 0,
            emergency_units: 0,
            dominant_class: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub status: String,
}
