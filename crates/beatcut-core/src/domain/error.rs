//! Domain-level error taxonomy for beatcut.
//!
//! Only malformed inputs, illegal state transitions and the loss of every
//! collaborator before a first usable timeline are errors. Shortfalls,
//! refinement conflicts and exhausted loops are reported as data on the
//! result instead.

use crate::controller::state::Phase;
use crate::controller::ScoredTimeline;

/// A single broken input invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("audio duration must be finite and > 0, got {0}")]
    AudioDuration(f64),

    #[error("tempo must be finite and > 0, got {0}")]
    Tempo(f64),

    #[error("beat {index} at {at}s is outside [0, {duration}]")]
    BeatOutOfBounds { index: usize, at: f64, duration: f64 },

    #[error("beat {index} at {at}s does not strictly follow {previous}s")]
    BeatsNotIncreasing { index: usize, at: f64, previous: f64 },

    #[error("energy sample {index} = {value} is outside [0, 1]")]
    EnergyOutOfRange { index: usize, value: f64 },

    #[error("duplicate asset id: {0}")]
    DuplicateAsset(String),

    #[error("asset {id} quality score {score} is outside [0, 1]")]
    QualityOutOfRange { id: String, score: f64 },

    #[error("asset {id} has invalid duration {duration} for kind {kind}")]
    AssetDuration {
        id: String,
        kind: String,
        duration: f64,
    },

    #[error("target duration must be finite and > 0, got {0}")]
    TargetDuration(f64),

    #[error("invalid synthesis parameter {name}: {reason}")]
    Param { name: &'static str, reason: String },
}

/// beatcut domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BeatcutError {
    #[error("input invariant violation: {0}")]
    InputInvariantViolation(#[from] ValidationError),

    #[error("composition failed: {0}")]
    CompositionFailed(String),

    #[error("composition cancelled during {phase}")]
    Cancelled {
        phase: Phase,
        best: Option<Box<ScoredTimeline>>,
    },

    #[error("illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for beatcut domain operations.
pub type Result<T> = std::result::Result<T, BeatcutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_wraps_as_input_violation() {
        let err: BeatcutError = ValidationError::Tempo(-1.0).into();
        let msg = err.to_string();
        assert!(msg.contains("input invariant violation"));
        assert!(msg.contains("tempo"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = BeatcutError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_cancelled_names_phase() {
        let err = BeatcutError::Cancelled {
            phase: Phase::AwaitingRender,
            best: None,
        };
        assert!(err.to_string().contains("awaiting_render"));
    }
}
