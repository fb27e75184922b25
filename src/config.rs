use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Width of one synchronization window (ms).
    pub synchronization_window_ms: i64,
    /// Drift above this triggers timestamp compensation (ms).
    pub max_time_drift_ms: f64,
    /// Windows below this synchronization quality are dropped.
    pub temporal_confidence_threshold: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            synchronization_window_ms: 200,
            max_time_drift_ms: 1000.0,
            temporal_confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Confidence gap between two modalities that counts as a conflict.
    pub conflict_threshold: f64,
    pub consistency_threshold: f64,
    pub min_modalities_for_validation: usize,
    /// Timestamp gap that counts as a temporal mismatch (ms).
    pub temporal_mismatch_threshold_ms: f64,
    /// Average insight length treated as full quality (chars).
    pub insight_length_baseline: f64,
    /// Floor for the pass/fail minimum-confidence rule.
    pub min_rule_confidence: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            conflict_threshold: 0.7,
            consistency_threshold: 0.6,
            min_modalities_for_validation: 2,
            temporal_mismatch_threshold_ms: 5000.0,
            insight_length_baseline: 30.0,
            min_rule_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightingConfig {
    /// Floor for every confidence/weight the pipeline emits.
    pub min_confidence_threshold: f64,
    /// Per-second retention factor for temporal decay.
    pub confidence_decay_rate: f64,
    /// History points used for temporal consistency.
    pub temporal_consistency_window: usize,
    pub adaptive_learning_rate: f64,
    pub uncertainty_amplification_factor: f64,
    pub reliability_learning_rate: f64,
    /// Bounded confidence history per modality.
    pub history_limit: usize,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: 0.1,
            confidence_decay_rate: 0.95,
            temporal_consistency_window: 3,
            adaptive_learning_rate: 0.1,
            uncertainty_amplification_factor: 1.5,
            reliability_learning_rate: 0.05,
            history_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub drift_compensation_enabled: bool,
    pub conflict_resolution_enabled: bool,
    pub pattern_analysis_enabled: bool,
    /// Off freezes adaptive weights and reliability at their current values.
    pub adaptive_learning_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            drift_compensation_enabled: true,
            conflict_resolution_enabled: true,
            pattern_analysis_enabled: true,
            adaptive_learning_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FusionConfig {
    pub temporal: TemporalConfig,
    pub validation: ValidationConfig,
    pub weighting: WeightingConfig,
    pub feature_flags: FeatureFlags,
}

impl FusionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FUSION_DRIFT_COMPENSATION_ENABLED") {
            config.feature_flags.drift_compensation_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("FUSION_CONFLICT_RESOLUTION_ENABLED") {
            config.feature_flags.conflict_resolution_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("FUSION_PATTERN_ANALYSIS_ENABLED") {
            config.feature_flags.pattern_analysis_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("FUSION_ADAPTIVE_LEARNING_ENABLED") {
            config.feature_flags.adaptive_learning_enabled = val.parse().unwrap_or(true);
        }

        config
    }
}
