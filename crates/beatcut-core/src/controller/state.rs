//! Per-request correction state and its phase table.

use serde::{Deserialize, Serialize};

use crate::domain::{BeatcutError, Evaluation, Result, Timeline};

/// Phase of one composition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Synthesizing,
    AwaitingRender,
    Evaluating,
    Deciding,
    Refining,
    Accepted,
    Exhausted,
    Degraded,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Accepted | Phase::Exhausted | Phase::Degraded | Phase::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Synthesizing => "synthesizing",
            Phase::AwaitingRender => "awaiting_render",
            Phase::Evaluating => "evaluating",
            Phase::Deciding => "deciding",
            Phase::Refining => "refining",
            Phase::Accepted => "accepted",
            Phase::Exhausted => "exhausted",
            Phase::Degraded => "degraded",
            Phase::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> to` is in the transition table.
    pub fn can_advance_to(self, to: Phase) -> bool {
        use Phase::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (Synthesizing, AwaitingRender)
                | (AwaitingRender, Evaluating)
                | (Evaluating, Deciding)
                | (Deciding, Accepted | Refining | Exhausted)
                | (Refining, Synthesizing)
                | (_, Degraded | Cancelled)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timeline together with the verdict it received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTimeline {
    pub timeline: Timeline,
    pub evaluation: Evaluation,
}

impl ScoredTimeline {
    pub fn score(&self) -> f64 {
        self.evaluation.overall_score
    }
}

/// Mutable state of one request, owned by its controller run.
#[derive(Debug, Clone)]
pub struct CorrectionState {
    iteration: u32,
    phase: Phase,
    best: Option<ScoredTimeline>,
}

impl Default for CorrectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            phase: Phase::Synthesizing,
            best: None,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn best(&self) -> Option<&ScoredTimeline> {
        self.best.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(ScoredTimeline::score)
    }

    pub fn take_best(&mut self) -> Option<ScoredTimeline> {
        self.best.take()
    }

    /// Move to `to`, rejecting transitions outside the table.
    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if !self.phase.can_advance_to(to) {
            return Err(BeatcutError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        if to == Phase::Synthesizing {
            self.iteration += 1;
        }
        self.phase = to;
        Ok(())
    }

    /// Keep `candidate` if it strictly beats the best so far.
    ///
    /// Ignored once terminal, so a cancelled request keeps the best it had.
    pub fn offer(&mut self, candidate: &ScoredTimeline) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        let better = self
            .best_score()
            .map_or(true, |best| candidate.score() > best);
        if better {
            self.best = Some(candidate.clone());
        }
        better
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: f64) -> ScoredTimeline {
        ScoredTimeline {
            timeline: Timeline::new(Vec::new(), 10.0),
            evaluation: Evaluation::new(score, true),
        }
    }

    #[test]
    fn test_happy_path_cycle() {
        let mut state = CorrectionState::new();
        for phase in [
            Phase::AwaitingRender,
            Phase::Evaluating,
            Phase::Deciding,
            Phase::Refining,
            Phase::Synthesizing,
        ] {
            state.advance(phase).unwrap();
        }
        assert_eq!(state.iteration(), 1);
        assert_eq!(state.phase(), Phase::Synthesizing);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut state = CorrectionState::new();
        let err = state.advance(Phase::Accepted).unwrap_err();
        assert!(matches!(
            err,
            BeatcutError::IllegalTransition {
                from: Phase::Synthesizing,
                to: Phase::Accepted
            }
        ));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut state = CorrectionState::new();
        state.advance(Phase::Cancelled).unwrap();
        assert!(state.advance(Phase::Synthesizing).is_err());
        assert!(!state.offer(&scored(9.0)));
        assert!(state.best().is_none());
    }

    #[test]
    fn test_best_only_improves() {
        let mut state = CorrectionState::new();
        assert!(state.offer(&scored(5.0)));
        assert!(!state.offer(&scored(4.0)));
        assert!(!state.offer(&scored(5.0)));
        assert!(state.offer(&scored(6.5)));
        assert_eq!(state.best_score(), Some(6.5));
    }

    #[test]
    fn test_phase_display_is_snake_case() {
        assert_eq!(Phase::AwaitingRender.to_string(), "awaiting_render");
    }
}
