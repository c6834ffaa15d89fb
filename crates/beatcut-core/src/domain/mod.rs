//! Domain models for beatcut.
//!
//! Canonical definitions for the core entities:
//! - `ScoredMediaAsset`: a media item annotated with quality and tags
//! - `AudioRhythmProfile`: beat grid, tempo and energy of the soundtrack
//! - `SynthesisParams`: knobs the refinement loop turns
//! - `Timeline`: ordered, contiguous segments with transitions
//! - `Evaluation`: the evaluator's structured judgement

pub mod asset;
pub mod audio;
pub mod digest;
pub mod error;
pub mod evaluation;
pub mod params;
pub mod timeline;

pub use asset::{validate_pool, AssetId, AssetKind, AssetLookup, AssetSource, ScoredMediaAsset};
pub use audio::AudioRhythmProfile;
pub use error::{BeatcutError, Result, ValidationError};
pub use evaluation::{Evaluation, Recommendation, RenderedArtifact};
pub use params::{SynthesisParams, TransitionStyle};
pub use timeline::{
    DurationShortfall, ShortfallKind, Timeline, TimelineMetadata, TimelineSegment,
};
