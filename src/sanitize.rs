//! Input scrubbing ahead of the numeric pipeline.
//!
//! A malformed analysis (NaN confidence, overflowed timestamp) must degrade
//! the cycle, never abort it; a missed coaching cue costs more than a
//! slightly mis-weighted one.

use crate::types::ModalityAnalysis;

pub fn is_malformed(analysis: &ModalityAnalysis) -> bool {
    !analysis.confidence.is_finite() || analysis.timestamp_ms < 0
}

pub fn has_malformed(analyses: &[ModalityAnalysis]) -> bool {
    analyses.iter().any(is_malformed)
}

/// Clamp confidences into [0,1] and zero out non-finite values. Timestamps
/// below zero are floored to zero so window math stays ordered.
pub fn sanitize_analyses(analyses: &mut [ModalityAnalysis]) {
    for analysis in analyses.iter_mut() {
        if !analysis.confidence.is_finite() {
            analysis.confidence = 0.0;
        } else {
            analysis.confidence = analysis.confidence.clamp(0.0, 1.0);
        }
        if analysis.timestamp_ms < 0 {
            analysis.timestamp_ms = 0;
        }
    }
}
