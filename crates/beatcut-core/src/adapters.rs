//! Collaborator contracts for the self-correction loop.
//!
//! These traits define the external seams:
//! - `Renderer`: turns a timeline plus asset sources into a rendered artifact
//! - `QualityEvaluator`: judges a rendered artifact
//! - `RefinementTranslator`: turns an evaluation or free text into commands
//!
//! All traits are async and vendor-agnostic. Every call receives the
//! request's cancellation token and is expected to stop cooperatively once
//! it fires. In-memory fakes live in the `fakes` module.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{AssetLookup, Evaluation, RenderedArtifact, Timeline};
use crate::refinement::RefinementCommand;

/// Result type for collaborator calls.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("cancelled")]
    Cancelled,
}

/// What the translator is asked to turn into commands.
#[derive(Debug, Clone, Copy)]
pub enum RefinementInput<'a> {
    Evaluation(&'a Evaluation),
    FreeText(&'a str),
}

/// External renderer.
///
/// Receives only the timeline and the sources it references; never any
/// evaluation or refinement state.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        timeline: &Timeline,
        assets: &AssetLookup,
        cancel: &CancellationToken,
    ) -> AdapterResult<RenderedArtifact>;
}

/// External quality judge.
#[async_trait]
pub trait QualityEvaluator: Send + Sync {
    /// Score `artifact` against the caller's stated intent on a 0-10 scale.
    async fn evaluate(
        &self,
        artifact: &RenderedArtifact,
        timeline: &Timeline,
        intent: &str,
        cancel: &CancellationToken,
    ) -> AdapterResult<Evaluation>;
}

/// Turns critique into parameter mutations.
#[async_trait]
pub trait RefinementTranslator: Send + Sync {
    async fn translate(
        &self,
        input: RefinementInput<'_>,
        cancel: &CancellationToken,
    ) -> AdapterResult<Vec<RefinementCommand>>;
}

/// The three collaborators one composition talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn Renderer>,
    pub evaluator: Arc<dyn QualityEvaluator>,
    pub translator: Arc<dyn RefinementTranslator>,
}

impl Collaborators {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        evaluator: Arc<dyn QualityEvaluator>,
        translator: Arc<dyn RefinementTranslator>,
    ) -> Self {
        Self {
            renderer,
            evaluator,
            translator,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
