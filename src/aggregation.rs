// src/aggregation.rs
//
// Folds per-unit predictions into the final verdict for a video.

use crate::types::{AnalysisResult, ClassPrediction, DecisionConfig, UnitResult};
use std::collections::HashMap;
use tracing::debug;

/// Aggregate a finished stream of unit results into one `AnalysisResult`.
///
/// Every top-K appearance contributes its probability to its class's
/// accumulated sum, so a class that shows up confidently without always
/// ranking first still surfaces. Confidences are normalized by the total
/// number of (unit, predicted-class) pairs. Pure and idempotent.
pub fn aggregate(units: &[UnitResult], decision: &DecisionConfig) -> AnalysisResult {
    if units.is_empty() {
        return AnalysisResult::empty();
    }

    let mut class_sums: HashMap<usize, f32> = HashMap::new();
    let mut total_pairs = 0usize;
    let mut emergency_units = 0usize;

    for unit in units {
        for prediction in &unit.predictions {
            *class_sums.entry(prediction.class_index).or_insert(0.0) += prediction.probability;
            total_pairs += 1;
        }
        if unit.is_emergency {
            emergency_units += 1;
        }
    }

    let mut ranked: Vec<(usize, f32)> = class_sums.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let top_predictions: Vec<ClassPrediction> = ranked
        .iter()
        .take(3)
        .map(|&(class_index, sum)| ClassPrediction {
            class_index,
            label: decision.label_for(class_index),
            probability: sum / total_pairs as f32,
            is_emergency: decision.is_emergency_class(class_index),
        })
        .collect();

    let emergency_ratio = emergency_units as f32 / units.len() as f32;

    let confident_emergency = top_predictions
        .first()
        .map(|top| top.is_emergency && top.probability > decision.confidence_threshold)
        .unwrap_or(false);
    let is_emergency = confident_emergency || emergency_ratio > decision.ratio_threshold;

    let dominant_class = top_predictions
        .first()
        .map(|top| top.label.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let confidence = top_predictions.first().map(|top| top.probability).unwrap_or(0.0);

    debug!(
        "aggregated {} units: dominant={} confidence={:.3} emergency_ratio={:.3}",
        units.len(),
        dominant_class,
        confidence,
        emergency_ratio
    );

    AnalysisResult {
        is_emergency,
        top_predictions,
        confidence,
        total_units: units.len(),
        emergency_units,
        dominant_class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::unit_result;
    use crate::types::Config;

    fn decision() -> DecisionConfig {
        Config::default().decision
    }

    fn unit_from_scores(scores: &[f32]) -> UnitResult {
        unit_result(scores, &decision())
    }

    #[test]
    fn test_empty_stream_yields_unknown() {
        let result = aggregate(&[], &decision());
        assert!(!result.is_emergency);
        assert_eq!(result.total_units, 0);
        assert_eq!(result.emergency_units, 0);
        assert_eq!(result.dominant_class, "unknown");
        assert!(result.top_predictions.is_empty());
    }

    #[test]
    fn test_dominant_class_and_top3() {
        let units: Vec<UnitResult> = (0..5)
            .map(|_| unit_from_scores(&[0.0, 0.0, 0.0, 0.0, 6.0, 0.0, 1.0, 0.5]))
            .collect();
        let result = aggregate(&units, &decision());
        assert_eq!(result.dominant_class, "fight");
        assert_eq!(result.top_predictions.len(), 3);
        assert_eq!(result.total_units, 5);
        for pair in result.top_predictions.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn test_confident_emergency_verdict() {
        // All units strongly "fight": confidence path trips the verdict even
        // before the ratio is considered.
        let units: Vec<UnitResult> = (0..4)
            .map(|_| unit_from_scores(&[0.0, 0.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0]))
            .collect();
        let result = aggregate(&units, &decision());
        assert!(result.is_emergency);
        assert_eq!(result.emergency_units, 4);
    }

    #[test]
    fn test_ratio_alone_trips_verdict() {
        // 3 of 10 units flagged (ratio 0.3 > 0.2) while the aggregate is
        // dominated by "normal", so only the ratio path can fire.
        let mut units: Vec<UnitResult> = (0..7)
            .map(|_| unit_from_scores(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0]))
            .collect();
        units.extend((0..3).map(|_| unit_from_scores(&[0.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0])));
        let result = aggregate(&units, &decision());
        assert_eq!(result.emergency_units, 3);
        assert_eq!(result.dominant_class, "normal");
        assert!(result.is_emergency);
    }

    #[test]
    fn test_all_normal_is_not_emergency() {
        let units: Vec<UnitResult> = (0..6)
            .map(|_| unit_from_scores(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0]))
            .collect();
        let result = aggregate(&units, &decision());
        assert!(!result.is_emergency);
        assert_eq!(result.emergency_units, 0);
        assert_eq!(result.dominant_class, "normal");
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let units: Vec<UnitResult> = (0..8)
            .map(|i| unit_from_scores(&[i as f32 * 0.3, 0.0, 0.5, 0.0, 2.0, 0.0, 1.0, 0.0]))
            .collect();
        let first = aggregate(&units, &decision());
        let second = aggregate(&units, &decision());
        assert_eq!(first.is_emergency, second.is_emergency);
        assert_eq!(first.total_units, second.total_units);
        assert_eq!(first.emergency_units, second.emergency_units);
        assert_eq!(first.dominant_class, second.dominant_class);
        assert_eq!(first.confidence, second.confidence);
        let firsts: Vec<usize> = first.top_predictions.iter().map(|p| p.class_index).collect();
        let seconds: Vec<usize> = second.top_predictions.iter().map(|p| p.class_index).collect();
        assert_eq!(firsts, seconds);
    }
}
