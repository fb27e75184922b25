//! Confidence weighting and per-modality trust evolution.
//!
//! Turns one window's validated analyses into normalized trust weights and
//! keeps the rolling per-modality state (confidence history, adaptive
//! weight, reliability) that persists for the lifetime of a coaching
//! session. The weigher never fails: a batch it cannot score cleanly comes
//! back as equal weights with midpoint placeholders.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::WeightingConfig;
use crate::insight::{self, InsightComparator, LexiconInsightComparator};
use crate::stats;
use crate::types::{
    CrossModalConfidence, Modality, ModalityAgreement, QualityMetrics,
    ValidatedModalityAnalysis, WeightedModalityAnalysis, EPSILON,
};

const CONFIDENCE_WEIGHT: f64 = 0.3;
const DYNAMIC_WEIGHT: f64 = 0.25;
const RELIABILITY_WEIGHT: f64 = 0.2;
const TEMPORAL_WEIGHT: f64 = 0.15;
const CERTAINTY_WEIGHT: f64 = 0.1;
const INSIGHT_COUNT_BONUS_CAP: f64 = 0.2;
const INSIGHT_COUNT_FULL_SCALE: f64 = 5.0;
const INSIGHT_LENGTH_BONUS_CAP: f64 = 0.1;
const INSIGHT_LENGTH_FULL_SCALE: f64 = 100.0;

/// Rolling trust record for one modality. Survives across fusion cycles;
/// reset only on session teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityTrust {
    pub confidence_history: VecDeque<f64>,
    pub adaptive_weight: f64,
    pub reliability_score: f64,
}

impl ModalityTrust {
    pub fn seeded(modality: &Modality) -> Self {
        Self {
            confidence_history: VecDeque::new(),
            adaptive_weight: modality.adaptive_weight_seed(),
            reliability_score: modality.reliability_seed(),
        }
    }
}

/// Per-session fusion state owned by the weigher's caller. One instance per
/// concurrent coaching session, never shared between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionFusionState {
    pub trust: HashMap<Modality, ModalityTrust>,
    pub cycle_count: u64,
    pub last_updated_ms: i64,
}

pub struct ConfidenceWeigher {
    config: WeightingConfig,
    comparator: Box<dyn InsightComparator>,
    learning_enabled: bool,
}

impl Default for ConfidenceWeigher {
    fn default() -> Self {
        Self::new(WeightingConfig::default())
    }
}

impl ConfidenceWeigher {
    pub fn new(config: WeightingConfig) -> Self {
        Self {
            config,
            comparator: Box::new(LexiconInsightComparator),
            learning_enabled: true,
        }
    }

    pub fn with_adaptive_learning(mut self, enabled: bool) -> Self {
        self.learning_enabled = enabled;
        self
    }

    /// Scores every validated analysis and normalizes the weights so they
    /// sum to 1.0 across the modalities present in this cycle. Updates the
    /// session's rolling trust state in place.
    pub fn weight_insights(
        &self,
        state: &mut SessionFusionState,
        validated: &[ValidatedModalityAnalysis],
    ) -> Vec<WeightedModalityAnalysis> {
        if validated.is_empty() {
            return Vec::new();
        }

        let mut weighted = Vec::with_capacity(validated.len());
        for entry in validated {
            let modality = &entry.analysis.modality;
            let confidence = entry.adjusted_confidence;

            let trust = state
                .trust
                .entry(modality.clone())
                .or_insert_with(|| ModalityTrust::seeded(modality));
            trust.confidence_history.push_back(confidence);
            while trust.confidence_history.len() > self.config.history_limit {
                trust.confidence_history.pop_front();
            }
            let history: Vec<f64> = trust.confidence_history.iter().copied().collect();

            let dynamic_weight = (trust.adaptive_weight
                + Self::quality_bonus(entry)
                + modality.contextual_relevance())
                / 3.0;

            let history_consistency = Self::consistency_over(&history);
            let reliability = (trust.reliability_score + history_consistency) / 2.0;

            let window = self.config.temporal_consistency_window;
            let recent_start = history.len().saturating_sub(window);
            let temporal_consistency = Self::consistency_over(&history[recent_start..]);

            let uncertainty =
                ((1.0 - confidence) + (1.0 - temporal_consistency) + (1.0 - confidence)) / 3.0;

            let raw_weight = (CONFIDENCE_WEIGHT * confidence
                + DYNAMIC_WEIGHT * dynamic_weight
                + RELIABILITY_WEIGHT * reliability
                + TEMPORAL_WEIGHT * temporal_consistency
                + CERTAINTY_WEIGHT * (1.0 - uncertainty))
                .clamp(self.config.min_confidence_threshold, 1.0);

            let quality = QualityMetrics {
                data_quality: entry.analysis.confidence,
                processing_quality: entry.validation_score,
                consistency_score: entry.consistency_score,
                overall_quality: (entry.analysis.confidence
                    + entry.validation_score
                    + entry.consistency_score)
                    / 3.0,
            };

            weighted.push(WeightedModalityAnalysis {
                analysis: entry.analysis.clone(),
                weight: raw_weight,
                confidence,
                reliability,
                temporal_consistency,
                uncertainty,
                quality,
            });
        }

        if weighted.iter().any(|w| !w.weight.is_finite()) {
            tracing::warn!("non-finite weight produced, falling back to equal weights");
            return Self::equal_weight_fallback(validated);
        }

        let total: f64 = weighted.iter().map(|w| w.weight).sum();
        if total > EPSILON {
            for entry in weighted.iter_mut() {
                entry.weight /= total;
            }
        } else {
            let equal = 1.0 / weighted.len() as f64;
            for entry in weighted.iter_mut() {
                entry.weight = equal;
            }
        }

        if self.learning_enabled {
            for entry in validated {
                if let Some(trust) = state.trust.get_mut(&entry.analysis.modality) {
                    trust.adaptive_weight = (trust.adaptive_weight
                        + self.config.adaptive_learning_rate
                            * (entry.adjusted_confidence - trust.adaptive_weight))
                        .clamp(self.config.min_confidence_threshold, 1.0);
                    trust.reliability_score = (trust.reliability_score
                        + self.config.reliability_learning_rate
                            * (entry.validation_score - trust.reliability_score))
                        .clamp(self.config.min_confidence_threshold, 1.0);
                }
            }
        }

        weighted
    }

    fn quality_bonus(entry: &ValidatedModalityAnalysis) -> f64 {
        let insights = &entry.analysis.insights;
        let count_bonus = (insights.len() as f64 / INSIGHT_COUNT_FULL_SCALE).min(1.0)
            * INSIGHT_COUNT_BONUS_CAP;
        let length_bonus = if insights.is_empty() {
            0.0
        } else {
            let avg_len = insights.iter().map(|s| s.chars().count() as f64).sum::<f64>()
                / insights.len() as f64;
            (avg_len / INSIGHT_LENGTH_FULL_SCALE).min(1.0) * INSIGHT_LENGTH_BONUS_CAP
        };
        count_bonus + length_bonus
    }

    /// Consistency of a confidence series: 1 minus its spread, capped so a
    /// wild series still reads as zero rather than negative. Two points
    /// minimum; below that the midpoint default applies.
    fn consistency_over(history: &[f64]) -> f64 {
        if history.len() < 2 {
            return 0.5;
        }
        1.0 - stats::stddev(history).min(1.0)
    }

    /// Agreement and compounded uncertainty across the cycle's weighted
    /// outputs. With fewer than two modalities consensus is trivially full.
    pub fn calculate_cross_modal_confidence(
        &self,
        weighted: &[WeightedModalityAnalysis],
    ) -> CrossModalConfidence {
        let overall_base: f64 = weighted.iter().map(|w| w.confidence * w.weight).sum();
        let uncertainty_sum: f64 = weighted.iter().map(|w| w.uncertainty * w.weight).sum();
        let uncertainty_propagation =
            (self.config.uncertainty_amplification_factor * uncertainty_sum).min(1.0);

        if weighted.len() < 2 {
            return CrossModalConfidence {
                modality_agreement: Vec::new(),
                consensus_level: 1.0,
                conflict_level: 0.0,
                overall_confidence: overall_base,
                uncertainty_propagation,
            };
        }

        let mut modality_agreement = Vec::new();
        for i in 0..weighted.len() {
            for j in (i + 1)..weighted.len() {
                let a = &weighted[i];
                let b = &weighted[j];
                let confidence_agreement = 1.0 - (a.confidence - b.confidence).abs();
                let insight_compatibility = insight::compatibility(
                    self.comparator.as_ref(),
                    &a.analysis.insights,
                    &b.analysis.insights,
                );
                modality_agreement.push(ModalityAgreement {
                    first: a.analysis.modality.clone(),
                    second: b.analysis.modality.clone(),
                    agreement: (confidence_agreement + insight_compatibility) / 2.0,
                });
            }
        }

        let agreements: Vec<f64> = modality_agreement.iter().map(|m| m.agreement).collect();
        let consensus_level = stats::mean(&agreements);
        let confidences: Vec<f64> = weighted.iter().map(|w| w.confidence).collect();
        let conflict_level = (2.0 * stats::stddev(&confidences)).min(1.0);

        CrossModalConfidence {
            modality_agreement,
            consensus_level,
            conflict_level,
            overall_confidence: overall_base * consensus_level,
            uncertainty_propagation,
        }
    }

    /// Exponential decay of confidence and weight with time since capture,
    /// floored so stale modalities fade without vanishing.
    pub fn apply_temporal_decay(
        &self,
        mut weighted: Vec<WeightedModalityAnalysis>,
        elapsed_ms: i64,
    ) -> Vec<WeightedModalityAnalysis> {
        let seconds = (elapsed_ms.max(0) as f64) / 1000.0;
        let decay_factor = self.config.confidence_decay_rate.powf(seconds);
        let floor = self.config.min_confidence_threshold;
        for entry in weighted.iter_mut() {
            entry.confidence = (entry.confidence * decay_factor).max(floor);
            entry.weight = (entry.weight * decay_factor).max(floor);
        }
        weighted
    }

    /// Safety net for a batch the scoring could not handle: every modality
    /// gets the same weight and midpoint placeholder scores so downstream
    /// coaching always has something to act on.
    fn equal_weight_fallback(
        validated: &[ValidatedModalityAnalysis],
    ) -> Vec<WeightedModalityAnalysis> {
        let equal = 1.0 / validated.len() as f64;
        validated
            .iter()
            .map(|entry| WeightedModalityAnalysis {
                analysis: entry.analysis.clone(),
                weight: equal,
                confidence: 0.5,
                reliability: 0.5,
                temporal_consistency: 0.5,
                uncertainty: 0.5,
                quality: QualityMetrics::midpoint(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModalityAnalysis, ValidationFlag};

    fn validated(
        modality: Modality,
        confidence: f64,
        ts: i64,
    ) -> ValidatedModalityAnalysis {
        ValidatedModalityAnalysis {
            analysis: ModalityAnalysis::new(modality, confidence, ts),
            validation_score: 0.8,
            conflicts: Vec::new(),
            consistency_score: 0.9,
            adjusted_confidence: confidence,
            validation_flags: vec![ValidationFlag::HighAgreement],
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted = weigher.weight_insights(
            &mut state,
            &[
                validated(Modality::Pose, 0.9, 1000),
                validated(Modality::Audio, 0.6, 1000),
                validated(Modality::Environment, 0.4, 1000),
            ],
        );
        let total: f64 = weighted.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_modality_full_weight() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted =
            weigher.weight_insights(&mut state, &[validated(Modality::Vision, 0.6, 1000)]);
        assert_eq!(weighted.len(), 1);
        assert!((weighted[0].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_empty_output() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        assert!(weigher.weight_insights(&mut state, &[]).is_empty());
    }

    #[test]
    fn test_history_bounded_at_limit() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        for i in 0..15 {
            weigher.weight_insights(
                &mut state,
                &[validated(Modality::Pose, 0.5 + 0.01 * i as f64, 1000 + i)],
            );
        }
        let trust = state.trust.get(&Modality::Pose).unwrap();
        assert_eq!(trust.confidence_history.len(), 10);
        // oldest entries evicted first
        assert!((trust.confidence_history[0] - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_consistency_flat_history_is_one() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let mut last = Vec::new();
        for _ in 0..4 {
            last = weigher
                .weight_insights(&mut state, &[validated(Modality::Pose, 0.9, 1000)]);
        }
        assert_eq!(last[0].temporal_consistency, 1.0);
    }

    #[test]
    fn test_adaptive_weight_moves_toward_confidence() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        // pose seeds at 0.9; repeated weak confidence should pull it down
        for _ in 0..20 {
            weigher.weight_insights(&mut state, &[validated(Modality::Pose, 0.2, 1000)]);
        }
        let trust = state.trust.get(&Modality::Pose).unwrap();
        assert!(trust.adaptive_weight < 0.5);
        assert!(trust.adaptive_weight >= 0.1);
    }

    #[test]
    fn test_learning_disabled_freezes_trust() {
        let weigher = ConfidenceWeigher::default().with_adaptive_learning(false);
        let mut state = SessionFusionState::default();
        for _ in 0..10 {
            weigher.weight_insights(&mut state, &[validated(Modality::Pose, 0.2, 1000)]);
        }
        let trust = state.trust.get(&Modality::Pose).unwrap();
        assert_eq!(trust.adaptive_weight, Modality::Pose.adaptive_weight_seed());
        assert_eq!(trust.reliability_score, Modality::Pose.reliability_seed());
    }

    #[test]
    fn test_insight_bonus_raises_weight_share() {
        let weigher = ConfidenceWeigher::default();
        let mut rich = validated(Modality::Audio, 0.7, 1000);
        rich.analysis.insights = vec![
            "breathing cadence steady through the set and matched to reps".to_string(),
            "exhale timing aligned with exertion phase".to_string(),
            "no vocal strain markers detected".to_string(),
            "ambient noise not interfering with capture".to_string(),
            "rhythm maintained during final reps".to_string(),
        ];
        let poor = validated(Modality::Vision, 0.7, 1000);

        let mut state = SessionFusionState::default();
        let weighted = weigher.weight_insights(&mut state, &[rich, poor]);
        let audio = weighted
            .iter()
            .find(|w| w.analysis.modality == Modality::Audio)
            .unwrap();
        let vision = weighted
            .iter()
            .find(|w| w.analysis.modality == Modality::Vision)
            .unwrap();
        // audio seeds lower than vision on both trust tables; the insight
        // bonus has to be what closes the gap
        assert!(audio.weight > vision.weight - 0.05);
    }

    #[test]
    fn test_all_outputs_clamped() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted = weigher.weight_insights(
            &mut state,
            &[
                validated(Modality::Pose, 0.1, 1000),
                validated(Modality::Emotional, 1.0, 1000),
            ],
        );
        for entry in &weighted {
            assert!(entry.confidence >= 0.1 && entry.confidence <= 1.0);
            assert!(entry.reliability >= 0.0 && entry.reliability <= 1.0);
            assert!(entry.temporal_consistency >= 0.0 && entry.temporal_consistency <= 1.0);
            assert!(entry.uncertainty >= 0.0 && entry.uncertainty <= 1.0);
        }
    }

    #[test]
    fn test_cross_modal_trivial_consensus_single() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted =
            weigher.weight_insights(&mut state, &[validated(Modality::Pose, 0.8, 1000)]);
        let cross = weigher.calculate_cross_modal_confidence(&weighted);
        assert_eq!(cross.consensus_level, 1.0);
        assert_eq!(cross.conflict_level, 0.0);
    }

    #[test]
    fn test_cross_modal_conflict_level_tracks_spread() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let tight = weigher.weight_insights(
            &mut state,
            &[
                validated(Modality::Pose, 0.8, 1000),
                validated(Modality::Audio, 0.78, 1000),
            ],
        );
        let mut state2 = SessionFusionState::default();
        let wide = weigher.weight_insights(
            &mut state2,
            &[
                validated(Modality::Pose, 0.95, 1000),
                validated(Modality::Audio, 0.15, 1000),
            ],
        );
        let tight_cross = weigher.calculate_cross_modal_confidence(&tight);
        let wide_cross = weigher.calculate_cross_modal_confidence(&wide);
        assert!(wide_cross.conflict_level > tight_cross.conflict_level);
        assert!(wide_cross.consensus_level < tight_cross.consensus_level);
    }

    #[test]
    fn test_uncertainty_propagation_amplified_and_capped() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted = weigher.weight_insights(
            &mut state,
            &[
                validated(Modality::Pose, 0.15, 1000),
                validated(Modality::Audio, 0.12, 1000),
            ],
        );
        let cross = weigher.calculate_cross_modal_confidence(&weighted);
        let raw: f64 = weighted.iter().map(|w| w.uncertainty * w.weight).sum();
        assert!(cross.uncertainty_propagation >= raw.min(1.0));
        assert!(cross.uncertainty_propagation <= 1.0);
    }

    #[test]
    fn test_decay_monotonic_and_floored() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted = weigher.weight_insights(
            &mut state,
            &[
                validated(Modality::Pose, 0.9, 1000),
                validated(Modality::Audio, 0.8, 1000),
            ],
        );
        let at_1s = weigher.apply_temporal_decay(weighted.clone(), 1000);
        let at_10s = weigher.apply_temporal_decay(weighted.clone(), 10_000);
        let at_10min = weigher.apply_temporal_decay(weighted.clone(), 600_000);
        for i in 0..weighted.len() {
            assert!(at_10s[i].weight <= at_1s[i].weight);
            assert!(at_10s[i].confidence <= at_1s[i].confidence);
            assert!(at_10min[i].weight >= 0.1);
            assert!(at_10min[i].confidence >= 0.1);
        }
    }

    #[test]
    fn test_decay_zero_elapsed_identity() {
        let weigher = ConfidenceWeigher::default();
        let mut state = SessionFusionState::default();
        let weighted =
            weigher.weight_insights(&mut state, &[validated(Modality::Pose, 0.9, 1000)]);
        let decayed = weigher.apply_temporal_decay(weighted.clone(), 0);
        assert!((decayed[0].weight - weighted[0].weight).abs() < 1e-12);
    }
}
