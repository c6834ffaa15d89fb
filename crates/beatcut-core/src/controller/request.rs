//! Composition requests and results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{
    AudioRhythmProfile, DurationShortfall, Evaluation, ScoredMediaAsset, SynthesisParams,
    Timeline,
};
use crate::refinement::RefinementWarning;

/// One call to `compose`.
///
/// Pool and audio sit behind `Arc` so concurrent requests can share a
/// read-only view; exclusions and pins live in the per-request params.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub request_id: String,
    pub pool: Arc<Vec<ScoredMediaAsset>>,
    pub audio: Arc<AudioRhythmProfile>,
    pub target_duration: f64,
    pub params: SynthesisParams,
    /// Overrides the configured loop bound.
    pub max_iterations: Option<u32>,
    /// Overrides the configured acceptance threshold.
    pub score_threshold: Option<f64>,
    /// What the caller wants; forwarded to the evaluator.
    pub intent: String,
    /// Free-text feedback folded into the params before iteration 0.
    pub feedback: Option<String>,
}

impl CompositionRequest {
    pub fn new(
        pool: impl Into<Arc<Vec<ScoredMediaAsset>>>,
        audio: impl Into<Arc<AudioRhythmProfile>>,
        target_duration: f64,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            pool: pool.into(),
            audio: audio.into(),
            target_duration,
            params: SynthesisParams::default(),
            max_iterations: None,
            score_threshold: None,
            intent: String::new(),
            feedback: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn with_params(mut self, params: SynthesisParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = intent.into();
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Why a composition stopped early with a best-effort result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradeReason {
    RenderFailed { error: String },
    EvaluationFailed { error: String },
    TranslationFailed { error: String },
    SynthesisOverBudget { budget_ms: u64 },
    /// The synthesizer produced no segments.
    Unrenderable,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RenderFailed { error } => write!(f, "render failed: {error}"),
            Self::EvaluationFailed { error } => write!(f, "evaluation failed: {error}"),
            Self::TranslationFailed { error } => write!(f, "translation failed: {error}"),
            Self::SynthesisOverBudget { budget_ms } => {
                write!(f, "synthesis exceeded its {budget_ms}ms budget")
            }
            Self::Unrenderable => f.write_str("synthesis produced an empty timeline"),
        }
    }
}

/// How a composition ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompositionOutcome {
    Accepted,
    /// The loop bound was reached below the quality bar.
    Exhausted,
    Degraded { reason: DegradeReason },
}

impl CompositionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Exhausted => "exhausted",
            Self::Degraded { .. } => "degraded",
        }
    }
}

/// One evaluated iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub score: f64,
    pub needs_refinement: bool,
    pub fingerprint: String,
    pub commands_applied: usize,
    #[serde(default)]
    pub shortfall: Option<DurationShortfall>,
}

/// What `compose` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionResult {
    pub request_id: String,
    pub timeline: Timeline,
    pub evaluation: Evaluation,
    pub iterations_used: u32,
    pub accepted: bool,
    pub outcome: CompositionOutcome,
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub warnings: Vec<RefinementWarning>,
}

impl CompositionResult {
    /// Best score seen after each evaluation.
    pub fn best_score_trace(&self) -> Vec<f64> {
        self.history
            .iter()
            .scan(f64::NEG_INFINITY, |best, r| {
                *best = best.max(r.score);
                Some(*best)
            })
            .collect()
    }
}
