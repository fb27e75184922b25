//! Fusion coordinator: the one entry point downstream modules call.
//!
//! Sequences temporal alignment, cross-modal validation, and confidence
//! weighting over one batch of per-modality analyses, and owns the
//! per-session rolling trust state. Cycles for the same session are
//! serialized by a per-session mutex; correctness of the rolling averages
//! depends on in-order updates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::config::FusionConfig;
use crate::metrics::{FusionMetrics, MetricsSnapshot};
use crate::sanitize;
use crate::temporal::TemporalAligner;
use crate::types::{
    ConflictResolutionSummary, FusedWindow, FusionResult, ModalityAnalysis,
    TemporalPatternAnalysis, WeightedModalityAnalysis,
};
use crate::validation::ConflictResolver;
use crate::weighting::{ConfidenceWeigher, SessionFusionState};

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("unknown session: {0}")]
    SessionNotFound(String),
    #[error("malformed session snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),
}

pub struct FusionEngine {
    config: FusionConfig,
    aligner: TemporalAligner,
    resolver: ConflictResolver,
    weigher: ConfidenceWeigher,
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionFusionState>>>>,
    metrics: FusionMetrics,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        let aligner = TemporalAligner::new(config.temporal.clone());
        let resolver = ConflictResolver::new(config.validation.clone());
        let weigher = ConfidenceWeigher::new(config.weighting.clone())
            .with_adaptive_learning(config.feature_flags.adaptive_learning_enabled);
        Self {
            config,
            aligner,
            resolver,
            weigher,
            sessions: RwLock::new(HashMap::new()),
            metrics: FusionMetrics::default(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Runs one fusion cycle for a session. Infallible by design: malformed
    /// input degrades the result, it never aborts the cycle.
    ///
    /// `reference_timestamp_ms` anchors staleness reporting; it plays no
    /// part in filtering or weighting.
    pub fn fuse(
        &self,
        session_id: &str,
        inputs: &[ModalityAnalysis],
        reference_timestamp_ms: i64,
    ) -> FusionResult {
        self.metrics.record_cycle();
        if inputs.is_empty() {
            return FusionResult::empty();
        }

        let session = self.session_handle(session_id);
        let mut state = session.lock();

        let mut batch: Vec<ModalityAnalysis> = inputs.to_vec();
        let degraded = sanitize::has_malformed(&batch);
        if degraded {
            tracing::warn!(
                session_id,
                count = batch.len(),
                "malformed analyses in fusion batch, sanitizing and degrading cycle"
            );
            self.metrics.record_degraded_cycle();
            sanitize::sanitize_analyses(&mut batch);
        }

        let drift = self.aligner.detect_timing_drift(&batch);
        if self.config.feature_flags.drift_compensation_enabled {
            batch = self.aligner.compensate_temporal_misalignment(batch, &drift);
        }

        let synchronized = self
            .aligner
            .synchronize_inputs(&batch, reference_timestamp_ms);
        let pattern = if self.config.feature_flags.pattern_analysis_enabled {
            self.aligner.analyze_temporal_patterns(&synchronized)
        } else {
            TemporalPatternAnalysis::degenerate()
        };

        let mut windows = Vec::with_capacity(synchronized.len());
        for window in synchronized {
            let mut validated = self.resolver.validate_analyses(&window.inputs);

            // The report reflects conflicts as detected; resolution runs
            // afterwards so its optimistic accounting cannot hide them from
            // telemetry.
            let report = self.resolver.generate_consistency_report(&validated);

            let detected: usize = validated.iter().map(|v| v.conflicts.len()).sum();
            let resolution = if self.config.feature_flags.conflict_resolution_enabled {
                self.resolver.resolve_conflicts(&mut validated)
            } else {
                ConflictResolutionSummary {
                    total_conflicts: detected,
                    resolved_conflicts: 0,
                    resolution_confidence: if detected == 0 { 1.0 } else { 0.0 },
                    notes: Vec::new(),
                }
            };
            self.metrics
                .record_conflicts(detected, resolution.resolved_conflicts);

            let weighted = self.weigher.weight_insights(&mut state, &validated);
            let cross_modal = self.weigher.calculate_cross_modal_confidence(&weighted);

            windows.push(FusedWindow {
                timestamp_ms: window.timestamp_ms,
                synchronization_quality: window.synchronization_quality,
                weighted,
                report,
                cross_modal,
                resolution,
            });
        }

        state.cycle_count += 1;
        state.last_updated_ms = chrono::Utc::now().timestamp_millis();
        self.metrics.record_windows(windows.len());

        tracing::debug!(
            session_id,
            windows = windows.len(),
            drift_severity = drift.severity.as_str(),
            pattern = pattern.pattern.as_str(),
            "fusion cycle complete"
        );

        FusionResult {
            windows,
            drift,
            pattern,
            degraded,
        }
    }

    /// Re-exposes temporal decay at the engine boundary so consumers can
    /// age a result they held onto before acting on it.
    pub fn apply_decay(
        &self,
        weighted: Vec<WeightedModalityAnalysis>,
        elapsed_ms: i64,
    ) -> Vec<WeightedModalityAnalysis> {
        self.weigher.apply_temporal_decay(weighted, elapsed_ms)
    }

    fn session_handle(&self, session_id: &str) -> Arc<Mutex<SessionFusionState>> {
        if let Some(existing) = self.sessions.read().get(session_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id, "fusion session created");
            Arc::new(Mutex::new(SessionFusionState::default()))
        }))
    }

    /// Tears down a session's rolling state. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "fusion session ended");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// JSON snapshot of a session's rolling state.
    pub fn snapshot_session(&self, session_id: &str) -> Result<String, FusionError> {
        let session = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| FusionError::SessionNotFound(session_id.to_string()))?;
        let state = session.lock();
        Ok(serde_json::to_string(&*state)?)
    }

    /// Restores a session from a snapshot, replacing any existing state.
    pub fn restore_session(&self, session_id: &str, snapshot: &str) -> Result<(), FusionError> {
        let state: SessionFusionState = serde_json::from_str(snapshot)?;
        self.sessions
            .write()
            .insert(session_id.to_string(), Arc::new(Mutex::new(state)));
        tracing::info!(session_id, "fusion session restored from snapshot");
        Ok(())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Modality;

    fn analysis(modality: Modality, confidence: f64, ts: i64) -> ModalityAnalysis {
        ModalityAnalysis::new(modality, confidence, ts)
    }

    #[test]
    fn test_fuse_empty_batch_is_empty_result() {
        let engine = FusionEngine::default();
        let result = engine.fuse("s1", &[], 0);
        assert!(result.windows.is_empty());
        assert!(!result.degraded);
    }

    #[test]
    fn test_fuse_happy_path_one_window() {
        let engine = FusionEngine::default();
        let result = engine.fuse(
            "s1",
            &[
                analysis(Modality::Pose, 0.9, 1000),
                analysis(Modality::Audio, 0.85, 1050),
            ],
            1000,
        );
        assert_eq!(result.windows.len(), 1);
        let window = result.latest().unwrap();
        let total: f64 = window.weighted.iter().map(|w| w.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(window.resolution.total_conflicts, 0);
    }

    #[test]
    fn test_fuse_degraded_flag_on_malformed_input() {
        let engine = FusionEngine::default();
        let result = engine.fuse(
            "s1",
            &[
                analysis(Modality::Pose, f64::NAN, 1000),
                analysis(Modality::Audio, 0.8, 1010),
            ],
            1000,
        );
        assert!(result.degraded);
        assert_eq!(result.windows.len(), 1);
        assert_eq!(engine.metrics().degraded_cycles, 1);
    }

    #[test]
    fn test_session_state_persists_across_cycles() {
        let engine = FusionEngine::default();
        for i in 0..5 {
            engine.fuse(
                "s1",
                &[analysis(Modality::Pose, 0.3, 1000 + i * 10_000)],
                1000 + i * 10_000,
            );
        }
        let snapshot = engine.snapshot_session("s1").unwrap();
        let state: SessionFusionState = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(state.cycle_count, 5);
        let trust = state.trust.get(&Modality::Pose).unwrap();
        assert_eq!(trust.confidence_history.len(), 5);
        // adaptive weight pulled below its 0.9 seed by weak confidence
        assert!(trust.adaptive_weight < 0.9);
    }

    #[test]
    fn test_sessions_isolated() {
        let engine = FusionEngine::default();
        engine.fuse("a", &[analysis(Modality::Pose, 0.2, 1000)], 1000);
        engine.fuse("b", &[analysis(Modality::Pose, 0.9, 1000)], 1000);
        assert_eq!(engine.active_sessions(), 2);
        let a: SessionFusionState =
            serde_json::from_str(&engine.snapshot_session("a").unwrap()).unwrap();
        let b: SessionFusionState =
            serde_json::from_str(&engine.snapshot_session("b").unwrap()).unwrap();
        let a_trust = a.trust.get(&Modality::Pose).unwrap();
        let b_trust = b.trust.get(&Modality::Pose).unwrap();
        assert!(a_trust.adaptive_weight < b_trust.adaptive_weight);
    }

    #[test]
    fn test_end_session_resets_state() {
        let engine = FusionEngine::default();
        engine.fuse("s1", &[analysis(Modality::Pose, 0.9, 1000)], 1000);
        assert!(engine.end_session("s1"));
        assert!(!engine.end_session("s1"));
        assert!(matches!(
            engine.snapshot_session("s1"),
            Err(FusionError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let engine = FusionEngine::default();
        engine.fuse("s1", &[analysis(Modality::Pose, 0.4, 1000)], 1000);
        let snapshot = engine.snapshot_session("s1").unwrap();
        engine.end_session("s1");
        engine.restore_session("s1", &snapshot).unwrap();
        let restored = engine.snapshot_session("s1").unwrap();
        let before: SessionFusionState = serde_json::from_str(&snapshot).unwrap();
        let after: SessionFusionState = serde_json::from_str(&restored).unwrap();
        assert_eq!(before.cycle_count, after.cycle_count);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let engine = FusionEngine::default();
        assert!(matches!(
            engine.restore_session("s1", "not json"),
            Err(FusionError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_conflict_metrics_recorded() {
        let engine = FusionEngine::default();
        engine.fuse(
            "s1",
            &[
                analysis(Modality::Pose, 0.95, 1000),
                analysis(Modality::Audio, 0.1, 1010),
            ],
            1000,
        );
        let metrics = engine.metrics();
        assert_eq!(metrics.conflicts_detected, 2);
        assert_eq!(metrics.conflicts_resolved, 2);
    }

    #[test]
    fn test_conflict_resolution_flag_off() {
        let mut config = FusionConfig::default();
        config.feature_flags.conflict_resolution_enabled = false;
        let engine = FusionEngine::new(config);
        let result = engine.fuse(
            "s1",
            &[
                analysis(Modality::Pose, 0.95, 1000),
                analysis(Modality::Audio, 0.1, 1010),
            ],
            1000,
        );
        let window = result.latest().unwrap();
        assert_eq!(window.resolution.resolved_conflicts, 0);
        assert_eq!(window.resolution.resolution_confidence, 0.0);
    }

    #[test]
    fn test_report_keeps_conflicts_despite_resolution() {
        let engine = FusionEngine::default();
        let result = engine.fuse(
            "s1",
            &[
                analysis(Modality::Pose, 0.95, 1000),
                analysis(Modality::Audio, 0.1, 1010),
            ],
            1000,
        );
        let window = result.latest().unwrap();
        assert_eq!(window.report.inconsistencies.len(), 2);
        assert_eq!(window.resolution.resolved_conflicts, 2);
    }

    #[test]
    fn test_spread_batch_yields_no_windows() {
        let engine = FusionEngine::default();
        let inputs: Vec<ModalityAnalysis> = (0..6)
            .map(|i| analysis(Modality::Pose, 0.9, 1000 + i * 30))
            .collect();
        let result = engine.fuse("s1", &inputs, 1000);
        assert!(result.windows.is_empty());
        assert!(result.latest().is_none());
    }
}
