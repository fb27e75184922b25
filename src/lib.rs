//! # posecoach-fusion - multi-modal fusion core
//!
//! Pure-Rust fusion pipeline for the Pose Coach app. Takes independent
//! per-sensor analyses (pose, audio, vision, emotional, environment)
//! produced at different rates and reliabilities and turns them into one
//! temporally-aligned, conflict-resolved, confidence-weighted judgment.
//!
//! ## Design goals
//!
//! - **Graceful degradation over precision** - every stage has a defined
//!   fallback output; the coaching pipeline never stalls on bad input
//! - **Per-session state** - rolling trust is owned by an explicit session
//!   object, never a process-wide singleton
//! - **Narrow surface** - downstream modules consume [`FusionResult`] and
//!   nothing else from the core
//! - **No I/O** - one fusion cycle is a finite computation over one bounded
//!   batch of already-captured data
//!
//! ## Module structure
//!
//! - [`temporal`] - synchronization windows, clock-drift analysis, pattern
//!   detection
//! - [`validation`] - cross-modal validation and conflict resolution
//! - [`weighting`] - normalized trust weights and adaptive per-modality
//!   learning
//! - [`engine`] - the coordinator sequencing the three stages per session
//! - [`insight`] - pluggable contradiction detection over insight text
//! - [`config`] / [`types`] - configuration surface and data model
//!
//! ## Example
//!
//! ```rust
//! use posecoach_fusion::{FusionEngine, Modality, ModalityAnalysis};
//!
//! let engine = FusionEngine::default();
//! let result = engine.fuse(
//!     "session-1",
//!     &[
//!         ModalityAnalysis::new(Modality::Pose, 0.9, 1_000),
//!         ModalityAnalysis::new(Modality::Audio, 0.85, 1_050),
//!     ],
//!     1_000,
//! );
//! if let Some(window) = result.latest() {
//!     for entry in &window.weighted {
//!         println!("{} -> {:.2}", entry.analysis.modality.as_str(), entry.weight);
//!     }
//! }
//! ```

pub mod config;
pub mod engine;
pub mod insight;
pub mod metrics;
pub mod sanitize;
pub mod stats;
pub mod temporal;
pub mod types;
pub mod validation;
pub mod weighting;

pub use config::{FeatureFlags, FusionConfig, TemporalConfig, ValidationConfig, WeightingConfig};
pub use engine::{FusionEngine, FusionError};
pub use insight::{InsightComparator, LexiconInsightComparator};
pub use metrics::MetricsSnapshot;
pub use temporal::TemporalAligner;
pub use types::*;
pub use validation::ConflictResolver;
pub use weighting::{ConfidenceWeigher, ModalityTrust, SessionFusionState};
