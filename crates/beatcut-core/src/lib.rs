//! beatcut core library
//!
//! Beat-aligned timeline synthesis and the bounded self-correction loop
//! around it.

pub mod adapters;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod refinement;
pub mod service;
pub mod synthesis;
pub mod telemetry;

pub use domain::{
    AssetId, AssetKind, AssetLookup, AudioRhythmProfile, BeatcutError, DurationShortfall,
    Evaluation, Recommendation, RenderedArtifact, Result, ScoredMediaAsset, ShortfallKind,
    SynthesisParams, Timeline, TimelineMetadata, TimelineSegment, TransitionStyle,
    ValidationError,
};

pub use synthesis::{synthesize, SynthesisOutcome};

pub use refinement::{
    apply_commands, parse_commands, RefinementCommand, RefinementOutcome, RefinementWarning,
    RuleBasedTranslator,
};

pub use adapters::{
    AdapterError, Collaborators, QualityEvaluator, RefinementInput, RefinementTranslator,
    Renderer,
};

pub use controller::{
    CompositionOutcome, CompositionRequest, CompositionResult, CorrectionState, DegradeReason,
    IterationRecord, Phase, RetryPolicy, ScoredTimeline, SelfCorrectionController,
};

pub use service::{CompositionHandle, CompositionService};

pub use artifact::{read_composition_artifact, write_composition_artifact};
pub use config::EngineConfig;

pub use metrics::METRICS;
pub use obs::CompositionSpan;
pub use telemetry::init_tracing;

/// beatcut version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
