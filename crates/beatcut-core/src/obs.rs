//! Structured observability hooks for the composition lifecycle.
//!
//! This module provides:
//! - Request-scoped tracing spans via the `CompositionSpan` RAII guard
//! - Emission functions for lifecycle events: start, synthesis, evaluation,
//!   retry, refinement and finish
//!
//! Events are emitted at `info!` level unless noted (filter with
//! `BEATCUT_LOG`). For JSON output, set `log.json = true` or
//! `BEATCUT_LOG_JSON=1`.

use tracing::{info, warn};

use crate::domain::{DurationShortfall, Timeline};

/// RAII guard that enters a request-scoped span for the duration of a
/// composition.
///
/// # Example
///
/// ```ignore
/// let _span = CompositionSpan::enter("req-12345");
/// // every event below now carries request_id = "req-12345"
/// ```
pub struct CompositionSpan {
    _span: tracing::span::EnteredSpan,
}

impl CompositionSpan {
    pub fn enter(request_id: &str) -> Self {
        Self {
            _span: span(request_id).entered(),
        }
    }
}

/// The request span itself, for instrumenting futures that cross `.await`.
pub fn span(request_id: &str) -> tracing::Span {
    tracing::info_span!("beatcut.composition", request_id = %request_id)
}

/// Emit event: composition started.
pub fn emit_composition_started(request_id: &str, pool_size: usize, target_duration: f64) {
    info!(
        event = "composition.started",
        request_id = %request_id,
        pool_size = pool_size,
        target_duration = target_duration,
    );
}

/// Emit event: a timeline came out of the synthesizer.
pub fn emit_timeline_synthesized(timeline: &Timeline, shortfall: Option<&DurationShortfall>) {
    match shortfall {
        None => info!(
            event = "timeline.synthesized",
            segments = timeline.segments.len(),
            total_duration = timeline.total_duration,
            reuse = timeline.metadata.reuse_permitted,
        ),
        Some(shortfall) => warn!(
            event = "timeline.shortfall",
            segments = timeline.segments.len(),
            total_duration = timeline.total_duration,
            shortfall = %shortfall,
        ),
    }
}

/// Emit event: evaluator verdict for one iteration.
pub fn emit_iteration_evaluated(
    request_id: &str,
    iteration: u32,
    score: f64,
    needs_refinement: bool,
) {
    info!(
        event = "iteration.evaluated",
        request_id = %request_id,
        iteration = iteration,
        score = score,
        needs_refinement = needs_refinement,
    );
}

/// Emit event: an adapter call failed and will be retried (warning level).
pub fn emit_adapter_retry(
    adapter: &str,
    attempt: u32,
    backoff_ms: u64,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "adapter.retry",
        adapter = %adapter,
        attempt = attempt,
        backoff_ms = backoff_ms,
        error = %error,
    );
}

/// Emit event: refinement commands folded into the params.
pub fn emit_refinement_applied(request_id: &str, iteration: u32, applied: usize, reset: bool) {
    info!(
        event = "refinement.applied",
        request_id = %request_id,
        iteration = iteration,
        applied = applied,
        reset = reset,
    );
}

/// Emit event: a refinement command was dropped (warning level).
pub fn emit_refinement_warning(request_id: &str, warning: &dyn std::fmt::Display) {
    warn!(event = "refinement.warning", request_id = %request_id, warning = %warning);
}

/// Emit event: composition reached a terminal phase.
pub fn emit_composition_finished(
    request_id: &str,
    outcome: &str,
    iterations_used: u32,
    score: Option<f64>,
    duration_ms: u64,
) {
    info!(
        event = "composition.finished",
        request_id = %request_id,
        outcome = %outcome,
        iterations_used = iterations_used,
        score = score,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_composition_span_create() {
        let _span = CompositionSpan::enter("test-request");
    }

    #[traced_test]
    #[test]
    fn test_events_carry_request_id_from_span() {
        let _span = CompositionSpan::enter("req-span-1");
        emit_iteration_evaluated("req-span-1", 2, 6.5, true);
        assert!(logs_contain("iteration.evaluated"));
        assert!(logs_contain("req-span-1"));
    }

    #[traced_test]
    #[test]
    fn test_shortfall_is_a_warning() {
        let mut timeline = Timeline::new(Vec::new(), 30.0);
        timeline.total_duration = 12.0;
        let shortfall = DurationShortfall {
            target: 30.0,
            achieved: 12.0,
            kind: crate::domain::ShortfallKind::BeatsExhausted,
        };
        emit_timeline_synthesized(&timeline, Some(&shortfall));
        assert!(logs_contain("timeline.shortfall"));
        assert!(logs_contain("WARN"));
    }

    #[traced_test]
    #[test]
    fn test_retry_event_names_adapter() {
        emit_adapter_retry("renderer", 1, 250, &"connection reset");
        assert!(logs_contain("adapter.retry"));
        assert!(logs_contain("renderer"));
        assert!(logs_contain("connection reset"));
    }

    #[traced_test]
    #[test]
    fn test_finished_records_outcome() {
        emit_composition_finished("req-fin", "exhausted", 3, Some(5.0), 1200);
        assert!(logs_contain("composition.finished"));
        assert!(logs_contain("exhausted"));
    }
}
