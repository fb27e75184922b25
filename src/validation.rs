//! Cross-modal validation and conflict resolution.
//!
//! Given the analyses inside one synchronization window, scores how well
//! each modality agrees with the others, surfaces pairwise conflicts, and
//! attempts automated resolution. On malformed input the whole window is
//! wrapped in a degraded-but-usable result; nothing here returns an error.

use crate::config::ValidationConfig;
use crate::insight::{InsightComparator, LexiconInsightComparator};
use crate::sanitize;
use crate::stats;
use crate::types::{
    ConflictKind, ConflictResolutionSummary, ConsistencyReport, Inconsistency, Modality,
    ModalityAnalysis, ModalityConflict, ValidatedModalityAnalysis, ValidationFlag,
};

const INSIGHT_CONTRADICTION_SEVERITY: f64 = 0.6;
const TEMPORAL_SEVERITY_FULL_SCALE_MS: f64 = 10000.0;
const CONFIDENCE_ADJUST_AGREEMENT_GAIN: f64 = 0.2;
const CONFIDENCE_ADJUST_CONFLICT_PENALTY: f64 = 0.1;
const CONFIDENCE_ADJUST_CONSISTENCY_GAIN: f64 = 0.15;
const RESOLVED_CONFIDENCE_BOOST: f64 = 1.1;
const DEFAULT_RULE_SCORE: f64 = 0.7;
const LOW_CONSISTENCY_RECOMMENDATION_THRESHOLD: f64 = 0.5;
const HIGH_SEVERITY_RECOMMENDATION_THRESHOLD: f64 = 0.8;
const HIGH_AGREEMENT_FLAG_THRESHOLD: f64 = 0.8;
const LOW_AGREEMENT_FLAG_THRESHOLD: f64 = 0.4;

pub struct ConflictResolver {
    config: ValidationConfig,
    comparator: Box<dyn InsightComparator>,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl ConflictResolver {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            comparator: Box::new(LexiconInsightComparator),
        }
    }

    /// Swap the contradiction detector without touching the scoring math.
    pub fn with_comparator(config: ValidationConfig, comparator: Box<dyn InsightComparator>) -> Self {
        Self { config, comparator }
    }

    /// Validates one window's analyses against each other.
    ///
    /// Below the modality minimum each analysis gets a trivial pass; with a
    /// malformed batch every analysis is wrapped in the degraded fallback.
    pub fn validate_analyses(
        &self,
        analyses: &[ModalityAnalysis],
    ) -> Vec<ValidatedModalityAnalysis> {
        if sanitize::has_malformed(analyses) {
            tracing::warn!(
                count = analyses.len(),
                "malformed analyses in window, returning degraded validation"
            );
            return self.fallback_validation(analyses);
        }

        if analyses.len() < self.config.min_modalities_for_validation {
            return analyses
                .iter()
                .map(|analysis| self.validate_single(analysis, analyses))
                .collect();
        }

        analyses
            .iter()
            .map(|target| self.validate_against_window(target, analyses))
            .collect()
    }

    fn validate_single(
        &self,
        analysis: &ModalityAnalysis,
        window: &[ModalityAnalysis],
    ) -> ValidatedModalityAnalysis {
        let validation_score = self.apply_validation_rules(analysis, window);
        let consistency_score = 1.0;
        let adjusted_confidence = self.adjust_confidence(
            analysis.confidence,
            validation_score,
            0,
            consistency_score,
        );
        ValidatedModalityAnalysis {
            analysis: analysis.clone(),
            validation_score,
            conflicts: Vec::new(),
            consistency_score,
            adjusted_confidence,
            validation_flags: vec![ValidationFlag::SingleModality],
        }
    }

    fn validate_against_window(
        &self,
        target: &ModalityAnalysis,
        window: &[ModalityAnalysis],
    ) -> ValidatedModalityAnalysis {
        let others: Vec<&ModalityAnalysis> = window
            .iter()
            .filter(|other| !std::ptr::eq(*other, target))
            .collect();

        let agreements: Vec<f64> = others
            .iter()
            .map(|other| self.pairwise_agreement(target, other))
            .collect();
        let validation_score = stats::mean(&agreements);

        let conflicts = self.detect_conflicts(target, &others);
        let consistency_score = self.apply_validation_rules(target, window);
        let adjusted_confidence = self.adjust_confidence(
            target.confidence,
            validation_score,
            conflicts.len(),
            consistency_score,
        );

        let mut validation_flags = Vec::new();
        if validation_score > HIGH_AGREEMENT_FLAG_THRESHOLD {
            validation_flags.push(ValidationFlag::HighAgreement);
        } else if validation_score < LOW_AGREEMENT_FLAG_THRESHOLD {
            validation_flags.push(ValidationFlag::LowAgreement);
        }
        if !conflicts.is_empty() {
            validation_flags.push(ValidationFlag::ConflictsDetected);
        }
        if consistency_score < self.config.consistency_threshold {
            validation_flags.push(ValidationFlag::LowConsistency);
        }

        ValidatedModalityAnalysis {
            analysis: target.clone(),
            validation_score,
            conflicts,
            consistency_score,
            adjusted_confidence,
            validation_flags,
        }
    }

    /// Agreement between two modalities: the average of confidence
    /// agreement and insight compatibility. Symmetric by construction.
    pub fn pairwise_agreement(&self, a: &ModalityAnalysis, b: &ModalityAnalysis) -> f64 {
        let confidence_agreement = 1.0 - (a.confidence - b.confidence).abs();
        let insight_compatibility = self.insight_compatibility(&a.insights, &b.insights);
        (confidence_agreement + insight_compatibility) / 2.0
    }

    fn insight_compatibility(&self, a: &[String], b: &[String]) -> f64 {
        crate::insight::compatibility(self.comparator.as_ref(), a, b)
    }

    fn detect_conflicts(
        &self,
        target: &ModalityAnalysis,
        others: &[&ModalityAnalysis],
    ) -> Vec<ModalityConflict> {
        let mut conflicts = Vec::new();
        for other in others {
            let confidence_gap = (target.confidence - other.confidence).abs();
            if confidence_gap > self.config.conflict_threshold {
                conflicts.push(ModalityConflict {
                    conflicting_modality: other.modality.clone(),
                    kind: ConflictKind::ConfidenceMismatch,
                    severity: confidence_gap.min(1.0),
                    description: format!(
                        "{} confidence {:.2} vs {} confidence {:.2}",
                        target.modality.as_str(),
                        target.confidence,
                        other.modality.as_str(),
                        other.confidence
                    ),
                });
            }

            for insight in &target.insights {
                for other_insight in &other.insights {
                    if self.comparator.contradicts(insight, other_insight) {
                        conflicts.push(ModalityConflict {
                            conflicting_modality: other.modality.clone(),
                            kind: ConflictKind::InsightContradiction,
                            severity: INSIGHT_CONTRADICTION_SEVERITY,
                            description: format!(
                                "'{}' contradicts {} finding '{}'",
                                insight,
                                other.modality.as_str(),
                                other_insight
                            ),
                        });
                    }
                }
            }

            let time_gap = (target.timestamp_ms - other.timestamp_ms).abs() as f64;
            if time_gap > self.config.temporal_mismatch_threshold_ms {
                conflicts.push(ModalityConflict {
                    conflicting_modality: other.modality.clone(),
                    kind: ConflictKind::TemporalMismatch,
                    severity: (time_gap / TEMPORAL_SEVERITY_FULL_SCALE_MS).min(1.0),
                    description: format!(
                        "{} sampled {:.0}ms apart from {}",
                        target.modality.as_str(),
                        time_gap,
                        other.modality.as_str()
                    ),
                });
            }
        }
        conflicts
    }

    fn adjust_confidence(
        &self,
        base: f64,
        cross_modal_score: f64,
        conflict_count: usize,
        consistency_score: f64,
    ) -> f64 {
        let adjusted = base
            + (cross_modal_score - 0.5) * CONFIDENCE_ADJUST_AGREEMENT_GAIN
            - CONFIDENCE_ADJUST_CONFLICT_PENALTY * conflict_count as f64
            + (consistency_score - 0.5) * CONFIDENCE_ADJUST_CONSISTENCY_GAIN;
        adjusted.clamp(0.1, 1.0)
    }

    /// Fixed rule set scored per analysis; the mean of applicable rules is
    /// the analysis's consistency score, defaulting when none apply.
    pub fn apply_validation_rules(
        &self,
        target: &ModalityAnalysis,
        window: &[ModalityAnalysis],
    ) -> f64 {
        let mut scores = Vec::new();

        // Minimum-confidence rule: binary pass/fail for every modality.
        scores.push(if target.confidence >= self.config.min_rule_confidence {
            1.0
        } else {
            0.0
        });

        // Insight-quality rule for insight-bearing modalities.
        if target.modality.carries_insights() && !target.insights.is_empty() {
            let avg_len = target
                .insights
                .iter()
                .map(|s| s.chars().count() as f64)
                .sum::<f64>()
                / target.insights.len() as f64;
            scores.push((avg_len / self.config.insight_length_baseline).min(1.0));
        }

        // Temporal-consistency rule needs at least one peer in the window.
        let gaps: Vec<f64> = window
            .iter()
            .filter(|other| !std::ptr::eq(*other, target))
            .map(|other| (target.timestamp_ms - other.timestamp_ms).abs() as f64)
            .collect();
        if !gaps.is_empty() {
            let mean_gap = stats::mean(&gaps);
            scores.push(1.0 - (mean_gap / self.config.temporal_mismatch_threshold_ms).min(1.0));
        }

        if scores.is_empty() {
            DEFAULT_RULE_SCORE
        } else {
            stats::mean(&scores)
        }
    }

    /// Automated resolution with optimistic accounting: the insight and
    /// temporal strategies note-and-accept without changing the underlying
    /// disagreement, yet still count as resolved, so the resolution
    /// confidence reads high even when nothing moved.
    pub fn resolve_conflicts(
        &self,
        validated: &mut [ValidatedModalityAnalysis],
    ) -> ConflictResolutionSummary {
        let total_conflicts: usize = validated.iter().map(|v| v.conflicts.len()).sum();
        if total_conflicts == 0 {
            return ConflictResolutionSummary {
                total_conflicts: 0,
                resolved_conflicts: 0,
                resolution_confidence: 1.0,
                notes: Vec::new(),
            };
        }

        let scores: Vec<(Modality, f64)> = validated
            .iter()
            .map(|v| (v.analysis.modality.clone(), v.validation_score))
            .collect();

        let mut resolved_conflicts = 0;
        let mut notes = Vec::new();

        for entry in validated.iter_mut() {
            if entry.conflicts.is_empty() {
                continue;
            }
            let own_score = entry.validation_score;
            for conflict in entry.conflicts.drain(..) {
                match conflict.kind {
                    ConflictKind::ConfidenceMismatch => {
                        let other_score = scores
                            .iter()
                            .find(|(m, _)| *m == conflict.conflicting_modality)
                            .map(|(_, s)| *s)
                            .unwrap_or(0.0);
                        let prioritized = if own_score >= other_score {
                            entry.analysis.modality.as_str().to_string()
                        } else {
                            conflict.conflicting_modality.as_str().to_string()
                        };
                        notes.push(format!(
                            "confidence mismatch: prioritized {} by validation score",
                            prioritized
                        ));
                    }
                    ConflictKind::InsightContradiction => {
                        notes.push(format!(
                            "insight contradiction with {}: weighted by cross-modal support",
                            conflict.conflicting_modality.as_str()
                        ));
                    }
                    ConflictKind::TemporalMismatch => {
                        notes.push(format!(
                            "temporal mismatch with {}: offset accepted",
                            conflict.conflicting_modality.as_str()
                        ));
                    }
                }
                resolved_conflicts += 1;
                entry.adjusted_confidence *= RESOLVED_CONFIDENCE_BOOST;
            }
            entry.adjusted_confidence = entry.adjusted_confidence.clamp(0.1, 1.0);
        }

        ConflictResolutionSummary {
            total_conflicts,
            resolved_conflicts,
            resolution_confidence: resolved_conflicts as f64 / total_conflicts as f64,
            notes,
        }
    }

    pub fn generate_consistency_report(
        &self,
        validated: &[ValidatedModalityAnalysis],
    ) -> ConsistencyReport {
        let consistencies: Vec<f64> = validated.iter().map(|v| v.consistency_score).collect();
        let overall_consistency = stats::mean(&consistencies);

        let mut inconsistencies = Vec::new();
        let mut recommendations = Vec::new();

        for entry in validated {
            for conflict in &entry.conflicts {
                inconsistencies.push(Inconsistency {
                    modality: entry.analysis.modality.clone(),
                    conflicting_modality: conflict.conflicting_modality.clone(),
                    kind: conflict.kind,
                    severity: conflict.severity,
                    description: conflict.description.clone(),
                });
                if conflict.severity > HIGH_SEVERITY_RECOMMENDATION_THRESHOLD {
                    recommendations.push(format!(
                        "investigate {} disagreement between {} and {}",
                        conflict.kind.as_str(),
                        entry.analysis.modality.as_str(),
                        conflict.conflicting_modality.as_str()
                    ));
                }
            }
            if entry.consistency_score < LOW_CONSISTENCY_RECOMMENDATION_THRESHOLD {
                recommendations.push(format!(
                    "review {} input quality: consistency {:.2} below expected range",
                    entry.analysis.modality.as_str(),
                    entry.consistency_score
                ));
            }
        }

        ConsistencyReport {
            overall_consistency,
            inconsistencies,
            recommendations,
        }
    }

    /// Degraded wrap for a window that could not be validated: midpoint
    /// scores, dampened confidence, explicit error flag.
    fn fallback_validation(
        &self,
        analyses: &[ModalityAnalysis],
    ) -> Vec<ValidatedModalityAnalysis> {
        let mut scrubbed: Vec<ModalityAnalysis> = analyses.to_vec();
        sanitize::sanitize_analyses(&mut scrubbed);
        scrubbed
            .into_iter()
            .map(|analysis| {
                let adjusted_confidence = (analysis.confidence * 0.8).clamp(0.1, 1.0);
                ValidatedModalityAnalysis {
                    analysis,
                    validation_score: 0.5,
                    conflicts: Vec::new(),
                    consistency_score: 0.5,
                    adjusted_confidence,
                    validation_flags: vec![ValidationFlag::ValidationError],
                }
            })
            .collect()
    }
}
