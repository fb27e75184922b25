//! Temporal alignment of asynchronous per-modality samples.
//!
//! Groups raw analyses into synchronization windows, characterizes clock
//! drift between modality streams, and classifies the temporal pattern of a
//! window sequence. Every public operation degrades to a neutral result on
//! insufficient data instead of failing.

use crate::config::TemporalConfig;
use crate::stats;
use crate::types::{
    DriftSeverity, Modality, ModalityAnalysis, ModalityDrift, SynchronizedInput, TemporalPattern,
    TemporalPatternAnalysis, TimingDriftAnalysis,
};

const TREND_SLOPE_THRESHOLD: f64 = 0.02;
const TREND_SLOPE_FULL_SCALE: f64 = 0.05;
const PERIODIC_CV_THRESHOLD: f64 = 0.2;
const STABILITY_VARIANCE_THRESHOLD: f64 = 0.01;
const MIN_INPUTS_FOR_PATTERNS: usize = 2;
const MIN_WINDOWS_FOR_PERIODICITY: usize = 3;

pub struct TemporalAligner {
    config: TemporalConfig,
}

impl Default for TemporalAligner {
    fn default() -> Self {
        Self::new(TemporalConfig::default())
    }
}

impl TemporalAligner {
    pub fn new(config: TemporalConfig) -> Self {
        Self { config }
    }

    /// Groups inputs into synchronization windows and drops windows whose
    /// quality falls below the temporal confidence threshold.
    ///
    /// A window's timestamp is the median of its members (upper median on
    /// even counts) so one stale or early sample cannot drag it.
    pub fn synchronize_inputs(
        &self,
        inputs: &[ModalityAnalysis],
        reference_timestamp_ms: i64,
    ) -> Vec<SynchronizedInput> {
        if inputs.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<ModalityAnalysis> = inputs.to_vec();
        sorted.sort_by_key(|a| a.timestamp_ms);

        let mut windows: Vec<Vec<ModalityAnalysis>> = Vec::new();
        let mut current: Vec<ModalityAnalysis> = Vec::new();
        let mut window_start = sorted[0].timestamp_ms;

        for analysis in sorted {
            if !current.is_empty()
                && analysis.timestamp_ms - window_start > self.config.synchronization_window_ms
            {
                windows.push(std::mem::take(&mut current));
                window_start = analysis.timestamp_ms;
            }
            current.push(analysis);
        }
        if !current.is_empty() {
            windows.push(current);
        }

        let total = windows.len();
        let mut synchronized = Vec::with_capacity(total);
        for members in windows {
            let first = members.first().map(|m| m.timestamp_ms).unwrap_or(0);
            let last = members.last().map(|m| m.timestamp_ms).unwrap_or(first);
            let spread = (last - first) as f64;
            let quality = (1.0 - spread / self.config.synchronization_window_ms as f64)
                .clamp(0.0, 1.0);
            if quality < self.config.temporal_confidence_threshold {
                continue;
            }

            let timestamps: Vec<i64> = members.iter().map(|m| m.timestamp_ms).collect();
            let median = stats::median_i64(&timestamps);
            synchronized.push(SynchronizedInput {
                timestamp_ms: median,
                inputs: members,
                synchronization_quality: quality,
                reference_offset_ms: median - reference_timestamp_ms,
            });
        }

        if synchronized.len() < total {
            tracing::debug!(
                kept = synchronized.len(),
                dropped = total - synchronized.len(),
                "synchronization windows below quality threshold dropped"
            );
        }
        synchronized
    }

    /// Pairwise clock-drift estimate across modality streams.
    ///
    /// Timestamp series are zipped by index, which assumes roughly matched
    /// sampling order across modalities; streams reporting at very different
    /// rates produce a figure that overstates true offset.
    pub fn detect_timing_drift(&self, inputs: &[ModalityAnalysis]) -> TimingDriftAnalysis {
        let mut series: Vec<(Modality, Vec<i64>)> = Vec::new();
        for analysis in inputs {
            match series.iter_mut().find(|(m, _)| *m == analysis.modality) {
                Some((_, timestamps)) => timestamps.push(analysis.timestamp_ms),
                None => series.push((analysis.modality.clone(), vec![analysis.timestamp_ms])),
            }
        }

        let mut modality_drifts = Vec::new();
        for i in 0..series.len() {
            for j in (i + 1)..series.len() {
                let (ref first, ref a) = series[i];
                let (ref second, ref b) = series[j];
                let paired = a.len().min(b.len());
                if paired == 0 {
                    continue;
                }
                let diffs: Vec<f64> = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y).abs() as f64)
                    .collect();
                modality_drifts.push(ModalityDrift {
                    first: first.clone(),
                    second: second.clone(),
                    drift_ms: stats::mean(&diffs),
                });
            }
        }

        if modality_drifts.is_empty() {
            return TimingDriftAnalysis::default();
        }

        let drifts: Vec<f64> = modality_drifts.iter().map(|d| d.drift_ms).collect();
        let max_drift_ms = drifts.iter().cloned().fold(0.0, f64::max);
        let average_drift_ms = stats::mean(&drifts);
        let severity = Self::classify_drift(max_drift_ms);

        TimingDriftAnalysis {
            max_drift_ms,
            average_drift_ms,
            modality_drifts,
            severity,
            recommended_correction: severity.recommended_correction(),
        }
    }

    fn classify_drift(max_drift_ms: f64) -> DriftSeverity {
        if max_drift_ms < 100.0 {
            DriftSeverity::Negligible
        } else if max_drift_ms < 500.0 {
            DriftSeverity::Minor
        } else if max_drift_ms < 1000.0 {
            DriftSeverity::Moderate
        } else {
            DriftSeverity::Severe
        }
    }

    /// Coarse drift correction: below the drift ceiling inputs pass through
    /// untouched; above it every timestamp shifts back by half the average
    /// drift. A uniform shift cannot change relative alignment between
    /// streams; this is a damage limiter, not a clock-offset estimator.
    pub fn compensate_temporal_misalignment(
        &self,
        inputs: Vec<ModalityAnalysis>,
        drift: &TimingDriftAnalysis,
    ) -> Vec<ModalityAnalysis> {
        if drift.max_drift_ms < self.config.max_time_drift_ms {
            return inputs;
        }
        let shift = (drift.average_drift_ms / 2.0).round() as i64;
        tracing::warn!(
            max_drift_ms = drift.max_drift_ms,
            shift_ms = shift,
            "drift above ceiling, applying coarse timestamp compensation"
        );
        inputs
            .into_iter()
            .map(|mut analysis| {
                analysis.timestamp_ms -= shift;
                analysis
            })
            .collect()
    }

    /// Classifies a time-ordered window sequence by running three
    /// independent detectors and keeping the most confident candidate.
    /// Ties fall to the earlier detector: trend, then periodicity, then
    /// stability.
    pub fn analyze_temporal_patterns(
        &self,
        windows: &[SynchronizedInput],
    ) -> TemporalPatternAnalysis {
        if windows.len() < MIN_INPUTS_FOR_PATTERNS {
            return TemporalPatternAnalysis::degenerate();
        }

        let mut candidates: Vec<(TemporalPattern, f64, String)> = Vec::new();

        // Detector 1: linear trend over per-window quality.
        let qualities: Vec<f64> = windows.iter().map(Self::window_quality).collect();
        let slope = stats::linear_slope(&qualities);
        if slope.is_finite() {
            let magnitude = (slope.abs() / TREND_SLOPE_FULL_SCALE).min(1.0);
            let (pattern, confidence) = if slope > TREND_SLOPE_THRESHOLD {
                (TemporalPattern::Improvement, magnitude)
            } else if slope < -TREND_SLOPE_THRESHOLD {
                (TemporalPattern::Degradation, magnitude)
            } else {
                (TemporalPattern::Stable, (1.0 - magnitude).clamp(0.0, 1.0))
            };
            candidates.push((
                pattern,
                confidence,
                format!("quality slope {:.4} over {} windows", slope, windows.len()),
            ));
        }

        // Detector 2: coefficient of variation of sampling intervals.
        if windows.len() >= MIN_WINDOWS_FOR_PERIODICITY {
            let intervals: Vec<f64> = windows
                .windows(2)
                .map(|pair| (pair[1].timestamp_ms - pair[0].timestamp_ms) as f64)
                .collect();
            let cv = stats::coefficient_of_variation(&intervals);
            if cv.is_finite() {
                let (pattern, confidence) = if cv < PERIODIC_CV_THRESHOLD {
                    (TemporalPattern::Periodic, (1.0 - cv).clamp(0.0, 1.0))
                } else {
                    (TemporalPattern::Irregular, cv.min(1.0))
                };
                candidates.push((pattern, confidence, format!("interval cv {:.3}", cv)));
            }
        }

        // Detector 3: variance of pose/audio confidence across windows.
        let signal: Vec<f64> = windows
            .iter()
            .filter_map(Self::pose_audio_confidence)
            .collect();
        if signal.len() >= MIN_INPUTS_FOR_PATTERNS {
            let var = stats::variance(&signal);
            let (pattern, confidence) = if var < STABILITY_VARIANCE_THRESHOLD {
                (
                    TemporalPattern::Stable,
                    (1.0 - var / STABILITY_VARIANCE_THRESHOLD).clamp(0.0, 1.0),
                )
            } else {
                (
                    TemporalPattern::Unstable,
                    (var / (STABILITY_VARIANCE_THRESHOLD * 10.0)).min(1.0),
                )
            };
            candidates.push((
                pattern,
                confidence,
                format!("pose/audio variance {:.4}", var),
            ));
        }

        let Some(best) = candidates
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Less))
        else {
            return TemporalPatternAnalysis::degenerate();
        };
        // max_by keeps the later of equal elements; scan in declared order
        // so the earlier detector wins ties instead.
        let best = candidates
            .iter()
            .find(|c| c.1 >= best.1)
            .unwrap_or(best);

        TemporalPatternAnalysis {
            pattern: best.0,
            confidence: best.1,
            key_points: candidates.iter().map(|c| c.2.clone()).collect(),
        }
    }

    fn window_quality(window: &SynchronizedInput) -> f64 {
        let confidences: Vec<f64> = window.inputs.iter().map(|a| a.confidence).collect();
        (window.synchronization_quality + stats::mean(&confidences)) / 2.0
    }

    fn pose_audio_confidence(window: &SynchronizedInput) -> Option<f64> {
        let confidences: Vec<f64> = window
            .inputs
            .iter()
            .filter(|a| matches!(a.modality, Modality::Pose | Modality::Audio))
            .map(|a| a.confidence)
            .collect();
        if confidences.is_empty() {
            None
        } else {
            Some(stats::mean(&confidences))
        }
    }
}
