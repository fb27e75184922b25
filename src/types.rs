use serde::{Deserialize, Serialize};

pub const EPSILON: f64 = 1e-9;

/// One independent sensing channel feeding the fusion core.
///
/// The closed set covers every analyzer the app ships; `Other` keeps unknown
/// identifiers flowing through the pipeline with generic defaults instead of
/// rejecting them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Modality {
    Pose,
    Audio,
    Vision,
    Emotional,
    Environment,
    Other(String),
}

impl Modality {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pose => "pose",
            Self::Audio => "audio",
            Self::Vision => "vision",
            Self::Emotional => "emotional",
            Self::Environment => "environment",
            Self::Other(name) => name.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pose" => Self::Pose,
            "audio" => Self::Audio,
            "vision" => Self::Vision,
            "emotional" => Self::Emotional,
            "environment" => Self::Environment,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Fixed domain importance for form coaching: body pose dominates,
    /// ambient environment matters least.
    pub fn contextual_relevance(&self) -> f64 {
        match self {
            Self::Pose => 0.9,
            Self::Vision => 0.8,
            Self::Audio => 0.7,
            Self::Emotional => 0.6,
            Self::Environment => 0.5,
            Self::Other(_) => 0.5,
        }
    }

    pub fn adaptive_weight_seed(&self) -> f64 {
        match self {
            Self::Pose => 0.9,
            Self::Vision => 0.8,
            Self::Audio => 0.7,
            Self::Emotional => 0.7,
            Self::Environment => 0.6,
            Self::Other(_) => 0.5,
        }
    }

    pub fn reliability_seed(&self) -> f64 {
        match self {
            Self::Pose => 0.9,
            Self::Vision => 0.8,
            Self::Environment => 0.8,
            Self::Audio => 0.7,
            Self::Emotional => 0.6,
            Self::Other(_) => 0.5,
        }
    }

    /// Whether the channel produces free-text findings worth scoring for
    /// insight quality.
    pub fn carries_insights(&self) -> bool {
        matches!(
            self,
            Self::Pose | Self::Audio | Self::Vision | Self::Emotional
        )
    }
}

impl From<String> for Modality {
    fn from(s: String) -> Self {
        Modality::parse(&s)
    }
}

impl From<Modality> for String {
    fn from(m: Modality) -> Self {
        m.as_str().to_string()
    }
}

/// One sensor's interpretation at a point in time, produced by an external
/// per-modality analyzer. Immutable for the duration of a fusion cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityAnalysis {
    pub modality: Modality,
    pub confidence: f64,
    pub insights: Vec<String>,
    pub timestamp_ms: i64,
}

impl ModalityAnalysis {
    pub fn new(modality: Modality, confidence: f64, timestamp_ms: i64) -> Self {
        Self {
            modality,
            confidence,
            insights: Vec::new(),
            timestamp_ms,
        }
    }

    pub fn with_insights(mut self, insights: Vec<String>) -> Self {
        self.insights = insights;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    ConfidenceMismatch,
    InsightContradiction,
    TemporalMismatch,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfidenceMismatch => "confidence_mismatch",
            Self::InsightContradiction => "insight_contradiction",
            Self::TemporalMismatch => "temporal_mismatch",
        }
    }
}

/// A detected disagreement between two modalities. Lives only within one
/// validation pass; resolution may remove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityConflict {
    pub conflicting_modality: Modality,
    pub kind: ConflictKind,
    pub severity: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    SingleModality,
    HighAgreement,
    LowAgreement,
    ConflictsDetected,
    LowConsistency,
    ValidationError,
}

impl ValidationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleModality => "single_modality",
            Self::HighAgreement => "high_agreement",
            Self::LowAgreement => "low_agreement",
            Self::ConflictsDetected => "conflicts_detected",
            Self::LowConsistency => "low_consistency",
            Self::ValidationError => "validation_error",
        }
    }
}

/// A modality analysis after cross-modal validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedModalityAnalysis {
    pub analysis: ModalityAnalysis,
    pub validation_score: f64,
    pub conflicts: Vec<ModalityConflict>,
    pub consistency_score: f64,
    pub adjusted_confidence: f64,
    pub validation_flags: Vec<ValidationFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub data_quality: f64,
    pub processing_quality: f64,
    pub consistency_score: f64,
    pub overall_quality: f64,
}

impl QualityMetrics {
    pub fn midpoint() -> Self {
        Self {
            data_quality: 0.5,
            processing_quality: 0.5,
            consistency_score: 0.5,
            overall_quality: 0.5,
        }
    }
}

/// Final fusion output for one modality in one cycle. Weights across the
/// modalities present in a window sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedModalityAnalysis {
    pub analysis: ModalityAnalysis,
    pub weight: f64,
    pub confidence: f64,
    pub reliability: f64,
    pub temporal_consistency: f64,
    pub uncertainty: f64,
    pub quality: QualityMetrics,
}

/// A time-bounded group of inputs treated as co-occurring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizedInput {
    /// Median member timestamp; upper median on even counts.
    pub timestamp_ms: i64,
    pub inputs: Vec<ModalityAnalysis>,
    pub synchronization_quality: f64,
    /// Median minus the cycle's reference timestamp. Telemetry only.
    pub reference_offset_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Negligible,
    Minor,
    Moderate,
    Severe,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negligible => "negligible",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }

    pub fn recommended_correction(&self) -> DriftCorrection {
        match self {
            Self::Negligible => DriftCorrection::None,
            Self::Minor => DriftCorrection::SoftwareCompensation,
            Self::Moderate => DriftCorrection::HardwareCalibration,
            Self::Severe => DriftCorrection::SystemResetRequired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCorrection {
    None,
    SoftwareCompensation,
    HardwareCalibration,
    SystemResetRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityDrift {
    pub first: Modality,
    pub second: Modality,
    pub drift_ms: f64,
}

/// Pairwise clock-drift characterization across modality streams.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingDriftAnalysis {
    pub max_drift_ms: f64,
    pub average_drift_ms: f64,
    pub modality_drifts: Vec<ModalityDrift>,
    pub severity: DriftSeverity,
    pub recommended_correction: DriftCorrection,
}

impl Default for TimingDriftAnalysis {
    fn default() -> Self {
        Self {
            max_drift_ms: 0.0,
            average_drift_ms: 0.0,
            modality_drifts: Vec::new(),
            severity: DriftSeverity::Negligible,
            recommended_correction: DriftCorrection::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPattern {
    Improvement,
    Degradation,
    Stable,
    Periodic,
    Irregular,
    Unstable,
}

impl TemporalPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improvement => "improvement",
            Self::Degradation => "degradation",
            Self::Stable => "stable",
            Self::Periodic => "periodic",
            Self::Irregular => "irregular",
            Self::Unstable => "unstable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalPatternAnalysis {
    pub pattern: TemporalPattern,
    pub confidence: f64,
    pub key_points: Vec<String>,
}

impl TemporalPatternAnalysis {
    /// Neutral result for insufficient data or any internal failure.
    pub fn degenerate() -> Self {
        Self {
            pattern: TemporalPattern::Irregular,
            confidence: 0.0,
            key_points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityAgreement {
    pub first: Modality,
    pub second: Modality,
    pub agreement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossModalConfidence {
    pub modality_agreement: Vec<ModalityAgreement>,
    pub consensus_level: f64,
    pub conflict_level: f64,
    pub overall_confidence: f64,
    pub uncertainty_propagation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inconsistency {
    pub modality: Modality,
    pub conflicting_modality: Modality,
    pub kind: ConflictKind,
    pub severity: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub overall_consistency: f64,
    pub inconsistencies: Vec<Inconsistency>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolutionSummary {
    pub total_conflicts: usize,
    pub resolved_conflicts: usize,
    pub resolution_confidence: f64,
    pub notes: Vec<String>,
}

/// One synchronization window carried through validation and weighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedWindow {
    pub timestamp_ms: i64,
    pub synchronization_quality: f64,
    pub weighted: Vec<WeightedModalityAnalysis>,
    pub report: ConsistencyReport,
    pub cross_modal: CrossModalConfidence,
    pub resolution: ConflictResolutionSummary,
}

/// The single consumer-facing output of one fusion cycle. Downstream
/// modules read this and nothing else from the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionResult {
    pub windows: Vec<FusedWindow>,
    pub drift: TimingDriftAnalysis,
    pub pattern: TemporalPatternAnalysis,
    pub degraded: bool,
}

impl FusionResult {
    /// Most recent fused window, if any survived synchronization.
    pub fn latest(&self) -> Option<&FusedWindow> {
        self.windows.last()
    }

    pub fn empty() -> Self {
        Self {
            windows: Vec::new(),
            drift: TimingDriftAnalysis::default(),
            pattern: TemporalPatternAnalysis::degenerate(),
            degraded: false,
        }
    }
}
