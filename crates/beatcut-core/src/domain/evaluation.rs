//! Rendered artifacts and the evaluator's structured judgement of them.

use serde::{Deserialize, Serialize};

/// Upper end of the evaluator's score scale.
pub const MAX_SCORE: f64 = 10.0;

/// Output of the external renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub uri: String,
    pub duration: f64,
}

/// Evaluator's overall advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    MinorAdjustments,
    MajorRework,
}

/// Structured judgement of one rendered timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score on a 0-10 scale.
    pub overall_score: f64,
    pub needs_refinement: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

impl Evaluation {
    pub fn new(overall_score: f64, needs_refinement: bool) -> Self {
        Self {
            overall_score,
            needs_refinement,
            issues: Vec::new(),
            strengths: Vec::new(),
            recommendation: None,
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }

    /// Whether this evaluation clears `threshold` without asking for changes.
    pub fn meets(&self, threshold: f64) -> bool {
        self.overall_score >= threshold && !self.needs_refinement
    }

    /// Reject scores the evaluator could not legitimately have produced.
    pub fn validate(&self) -> Result<(), String> {
        if !self.overall_score.is_finite() || !(0.0..=MAX_SCORE).contains(&self.overall_score) {
            return Err(format!(
                "overall_score {} is outside [0, {MAX_SCORE}]",
                self.overall_score
            ));
        }
        Ok(())
    }
}
