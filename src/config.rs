use crate::types::{
    Config, DecisionConfig, LoggingConfig, ModelConfig, Normalization, SamplingConfig, VideoConfig,
};
use anyhow::{bail, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.model.input_width == 0 || self.model.input_height == 0 {
            bail!("model input dimensions must be non-zero");
        }
        if self.model.frames_per_unit == 0 {
            bail!("frames_per_unit must be at least 1");
        }
        if self.model.num_classes == 0 {
            bail!("num_classes must be non-zero");
        }
        if self.decision.labels.len() != self.model.num_classes {
            bail!(
                "expected {} labels, got {}",
                self.model.num_classes,
                self.decision.labels.len()
            );
        }
        if let Some(&bad) = self
            .decision
            .emergency_classes
            .iter()
            .find(|&&c| c >= self.model.num_classes)
        {
            bail!(
                "emergency class index {} out of range (num_classes={})",
                bad,
                self.model.num_classes
            );
        }
        for (name, value) in [
            ("per_unit_threshold", self.decision.per_unit_threshold),
            ("confidence_threshold", self.decision.confidence_threshold),
            ("ratio_threshold", self.decision.ratio_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if self.decision.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.sampling.stride_ms <= 0 {
            bail!("stride_ms must be positive");
        }
        if self.sampling.unit_duration_ms <= 0 {
            bail!("unit_duration_ms must be positive");
        }
        if self.sampling.progress_split > 100 {
            bail!("progress_split must be within [0, 100]");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                path: "models/8cls.onnx".to_string(),
                input_width: 112,
                input_height: 112,
                frames_per_unit: 16,
                num_classes: 8,
                normalization: Normalization::Symmetric,
                num_threads: 4,
            },
            sampling: SamplingConfig {
                unit_duration_ms: 2000,
                stride_ms: 1000,
                default_duration_ms: 10_000,
                progress_split: 50,
            },
            decision: DecisionConfig {
                labels: [
                    "assault",
                    "pickpocket",
                    "date_violence",
                    "drunken",
                    "fight",
                    "kidnap",
                    "normal",
                    "robbery",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                emergency_classes: vec![0, 1, 2, 3, 4, 5, 7],
                per_unit_threshold: 0.4,
                top_k: 3,
                confidence_threshold: 0.3,
                ratio_threshold: 0.2,
            },
            video: VideoConfig {
                input_dir: "videos".to_string(),
                output_dir: "output".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
