//! SelfCorrectionController: the bounded evaluate and refine loop.
//!
//! `synthesizing -> awaiting_render -> evaluating -> deciding`, then
//! `accepted`, `exhausted` or `refining -> synthesizing`. Collaborator
//! failures end in `degraded`, a fired token in `cancelled`.

pub mod engine;
pub mod request;
pub mod retry;
pub mod state;

pub use engine::SelfCorrectionController;
pub use request::{
    CompositionOutcome, CompositionRequest, CompositionResult, DegradeReason, IterationRecord,
};
pub use retry::{with_retry, CallContext, CallError, RetryPolicy};
pub use state::{CorrectionState, Phase, ScoredTimeline};
