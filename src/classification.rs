// src/classification.rs
//
// Raw classifier scores -> ranked per-unit predictions.
//
// Contract: the classifier always returns raw, unnormalized scores and
// softmax is always applied here. A vector that already sums to ~1 is a
// degenerate but valid input; it goes through the same path (ranking is
// preserved, magnitudes are squashed) with no input-form detection.

use crate::types::{ClassPrediction, DecisionConfig, UnitResult};

/// Numerically stable softmax: subtract the max before exponentiating.
/// Output sums to 1 within floating-point tolerance and is invariant to
/// adding a constant to every input.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max_score = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_scores: Vec<f32> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum: f32 = exp_scores.iter().sum();
    exp_scores.iter().map(|&e| e / sum).collect()
}

/// Full ranked prediction list for one raw score vector, strictly descending
/// by probability, ties broken by ascending class index.
pub fn decode_scores(raw_scores: &[f32], decision: &DecisionConfig) -> Vec<ClassPrediction> {
    let probabilities = softmax(raw_scores);

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| {
        probabilities[b]
            .partial_cmp(&probabilities[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    order
        .into_iter()
        .map(|class_index| ClassPrediction {
            class_index,
            label: decision.label_for(class_index),
            probability: probabilities[class_index],
            is_emergency: decision.is_emergency_class(class_index),
        })
        .collect()
}

/// Per-unit outcome: top-K predictions plus the unit emergency flag.
///
/// A unit is flagged iff its top-1 class is in the emergency set and its
/// probability clears `per_unit_threshold`.
pub fn unit_result(raw_scores: &[f32], decision: &DecisionConfig) -> UnitResult {
    let ranked = decode_scores(raw_scores, decision);

    let is_emergency = ranked
        .first()
        .map(|top| top.is_emergency && top.probability > decision.per_unit_threshold)
        .unwrap_or(false);

    let predictions = ranked.into_iter().take(decision.top_k).collect();

    UnitResult {
        predictions,
        is_emergency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;

    fn decision() -> DecisionConfig {
        Config::default().decision
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let scores = [2.0, -1.0, 0.5, 3.3, 0.0, -2.7, 1.1, 0.9];
        let probs = softmax(&scores);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_softmax_shift_invariant() {
        let scores = [1.0, 2.0, 3.0, 4.0];
        let shifted: Vec<f32> = scores.iter().map(|s| s + 100.0).collect();
        let a = softmax(&scores);
        let b = softmax(&shifted);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_softmax_handles_large_scores() {
        let probs = softmax(&[1000.0, 999.0, 998.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_ranking_descending_with_index_tiebreak() {
        // Classes 1 and 3 tie; 1 must come first.
        let ranked = decode_scores(&[0.0, 2.0, 1.0, 2.0], &decision());
        let order: Vec<usize> = ranked.iter().map(|p| p.class_index).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
        for pair in ranked.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn test_one_hot_logit_probability() {
        // One dominant logit of 1 against seven zeros: top-1 = e/(e+7).
        let ranked = decode_scores(&[0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0], &decision());
        assert_eq!(ranked[0].class_index, 4);
        let expected = std::f32::consts::E / (std::f32::consts::E + 7.0);
        assert!((ranked[0].probability - expected).abs() < 1e-4);
    }

    #[test]
    fn test_pre_normalized_input_goes_through_same_path() {
        // Already a probability vector. No special-casing: softmax is still
        // applied, the top class survives, and the output sums to 1.
        let scores = [0.0, 0.0001, 0.0001, 0.0, 0.9995, 0.0, 0.0, 0.0002];
        let ranked = decode_scores(&scores, &decision());
        assert_eq!(ranked[0].class_index, 4);
        let sum: f32 = ranked.iter().map(|p| p.probability).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unit_flag_requires_emergency_top1_over_threshold() {
        let decision = decision();

        // Class 4 (fight) dominant and confident: flagged.
        let confident = unit_result(&[0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0], &decision);
        assert!(confident.is_emergency);
        assert_eq!(confident.predictions.len(), decision.top_k);

        // Class 6 (normal) dominant: not flagged regardless of confidence.
        let normal = unit_result(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0], &decision);
        assert!(!normal.is_emergency);

        // Emergency class on top but flat distribution: below threshold.
        let uncertain = unit_result(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], &decision);
        assert!(!uncertain.is_emergency);
    }
}
