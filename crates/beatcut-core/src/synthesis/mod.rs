//! TimelineSynthesizer: clustering, beat-grid pacing and asset selection.

pub mod cluster;
pub mod pacing;
pub mod select;
pub mod synthesizer;

pub use cluster::{cluster_assets, Cluster};
pub use synthesizer::{assign_transitions, synthesize, validate_inputs, SynthesisOutcome};
