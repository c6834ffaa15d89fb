//! The bounded synthesize, render, evaluate, refine loop.
//!
//! One request runs as a single sequential task; the only shared resource is
//! the adapter limiter. Everything mutable lives in the request's
//! [`CorrectionState`] and its local params.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::adapters::{AdapterError, Collaborators, RefinementInput};
use crate::config::{ControllerConfig, EngineConfig};
use crate::domain::{
    AssetLookup, BeatcutError, Evaluation, Recommendation, RenderedArtifact, Result,
    SynthesisParams, Timeline,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::refinement::{apply_commands, RefinementCommand, RefinementWarning};
use crate::synthesis::{synthesize, validate_inputs, SynthesisOutcome};

use super::request::{
    CompositionOutcome, CompositionRequest, CompositionResult, DegradeReason, IterationRecord,
};
use super::retry::{with_retry, CallContext, CallError, RetryPolicy};
use super::state::{CorrectionState, Phase, ScoredTimeline};

/// Drives one composition request at a time; cheap to clone and share.
#[derive(Debug, Clone)]
pub struct SelfCorrectionController {
    collaborators: Collaborators,
    config: ControllerConfig,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
}

enum Synthesized {
    Done(SynthesisOutcome),
    OverBudget,
    Cancelled,
}

/// Bookkeeping carried through one run.
struct Run {
    request_id: String,
    started: Instant,
    state: CorrectionState,
    history: Vec<IterationRecord>,
    warnings: Vec<RefinementWarning>,
}

impl SelfCorrectionController {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Self {
        Self {
            collaborators,
            config: config.controller.clone(),
            retry: RetryPolicy::from(&config.retry),
            limiter: Arc::new(Semaphore::new(
                config.concurrency.max_inflight_adapter_calls.max(1),
            )),
        }
    }

    /// Share an existing in-flight limiter with other controllers.
    pub fn with_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<Semaphore> {
        &self.limiter
    }

    /// Run the loop for `request` until it reaches a terminal phase.
    ///
    /// # Errors
    ///
    /// - `InputInvariantViolation` before any collaborator is called
    /// - `CompositionFailed` when no timeline was ever evaluated
    /// - `Cancelled` when `cancel` fires, carrying the best result so far
    pub async fn compose(
        &self,
        request: CompositionRequest,
        cancel: CancellationToken,
    ) -> Result<CompositionResult> {
        let span = obs::span(&request.request_id);
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: CompositionRequest,
        cancel: CancellationToken,
    ) -> Result<CompositionResult> {
        obs::emit_composition_started(
            &request.request_id,
            request.pool.len(),
            request.target_duration,
        );
        validate_inputs(
            &request.pool,
            &request.audio,
            request.target_duration,
            &request.params,
        )?;

        let max_iterations = request.max_iterations.unwrap_or(self.config.max_iterations);
        let threshold = request
            .score_threshold
            .unwrap_or(self.config.score_threshold);
        let mut run = Run {
            request_id: request.request_id.clone(),
            started: Instant::now(),
            state: CorrectionState::new(),
            history: Vec::new(),
            warnings: Vec::new(),
        };
        let mut params = request.params.clone();

        if let Some(feedback) = request.feedback.as_deref() {
            match self
                .translate(RefinementInput::FreeText(feedback), &cancel)
                .await
            {
                Ok(commands) => {
                    params = self.refine(&mut run, &request, &params, &commands, false);
                }
                Err(CallError::Cancelled) => return Err(self.cancelled(run)),
                Err(CallError::Exhausted { last, .. }) => {
                    warn!(error = %last, "initial feedback could not be translated");
                    run.warnings.push(RefinementWarning::Invalid {
                        reason: format!("feedback not translated: {last}"),
                    });
                }
            }
        }

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(run));
            }

            let outcome = match self.synthesize(&request, &params, &cancel).await? {
                Synthesized::Done(outcome) => outcome,
                Synthesized::Cancelled => return Err(self.cancelled(run)),
                Synthesized::OverBudget => {
                    let reason = DegradeReason::SynthesisOverBudget {
                        budget_ms: self.config.synthesis_budget_ms,
                    };
                    return self.degrade(run, reason);
                }
            };
            let shortfall = outcome.shortfall().cloned();
            let mut timeline = outcome.into_timeline();
            timeline.metadata.degraded = shortfall.is_some();
            if timeline.is_empty() {
                return self.degrade(run, DegradeReason::Unrenderable);
            }

            run.state.advance(Phase::AwaitingRender)?;
            let lookup = AssetLookup::for_ids(&request.pool, timeline.asset_ids());
            let artifact = match self.render(&timeline, &lookup, &cancel).await {
                Ok(artifact) => artifact,
                Err(CallError::Cancelled) => return Err(self.cancelled(run)),
                Err(CallError::Exhausted { last, .. }) => {
                    let reason = DegradeReason::RenderFailed {
                        error: last.to_string(),
                    };
                    return self.degrade(run, reason);
                }
            };

            run.state.advance(Phase::Evaluating)?;
            let evaluation = match self
                .evaluate(&artifact, &timeline, &request.intent, &cancel)
                .await
            {
                Ok(evaluation) => evaluation,
                Err(CallError::Cancelled) => return Err(self.cancelled(run)),
                Err(CallError::Exhausted { last, .. }) => {
                    let reason = DegradeReason::EvaluationFailed {
                        error: last.to_string(),
                    };
                    return self.degrade(run, reason);
                }
            };

            run.state.advance(Phase::Deciding)?;
            let iteration = run.state.iteration();
            obs::emit_iteration_evaluated(
                &run.request_id,
                iteration,
                evaluation.overall_score,
                evaluation.needs_refinement,
            );
            run.history.push(IterationRecord {
                iteration,
                score: evaluation.overall_score,
                needs_refinement: evaluation.needs_refinement,
                fingerprint: timeline.fingerprint()?,
                commands_applied: 0,
                shortfall,
            });
            let current = ScoredTimeline {
                timeline,
                evaluation,
            };
            run.state.offer(&current);

            if current.evaluation.meets(threshold) {
                run.state.advance(Phase::Accepted)?;
                // Never hand back a regression.
                let chosen = match run.state.take_best() {
                    Some(best) if best.score() > current.score() => best,
                    _ => current,
                };
                return Ok(self.finish(run, chosen, CompositionOutcome::Accepted));
            }
            if iteration >= max_iterations {
                run.state.advance(Phase::Exhausted)?;
                let chosen = run.state.take_best().unwrap_or(current);
                return Ok(self.finish(run, chosen, CompositionOutcome::Exhausted));
            }

            run.state.advance(Phase::Refining)?;
            let commands = match self
                .translate(RefinementInput::Evaluation(&current.evaluation), &cancel)
                .await
            {
                Ok(commands) => commands,
                Err(CallError::Cancelled) => return Err(self.cancelled(run)),
                Err(CallError::Exhausted { last, .. }) => {
                    let reason = DegradeReason::TranslationFailed {
                        error: last.to_string(),
                    };
                    return self.degrade(run, reason);
                }
            };
            let rework =
                current.evaluation.recommendation == Some(Recommendation::MajorRework);
            params = self.refine(&mut run, &request, &params, &commands, rework);
            run.state.advance(Phase::Synthesizing)?;
        }
    }

    /// Fold `commands` into `params`, resetting the look first on rework.
    fn refine(
        &self,
        run: &mut Run,
        request: &CompositionRequest,
        params: &SynthesisParams,
        commands: &[RefinementCommand],
        rework: bool,
    ) -> SynthesisParams {
        let start = if rework {
            params.reset_look(&request.params)
        } else {
            params.clone()
        };
        let outcome = apply_commands(&start, commands, &request.pool);
        for warning in &outcome.warnings {
            obs::emit_refinement_warning(&run.request_id, warning);
        }
        if let Some(last) = run.history.last_mut() {
            last.commands_applied = outcome.applied.len();
        }
        obs::emit_refinement_applied(
            &run.request_id,
            run.state.iteration(),
            outcome.applied.len(),
            rework,
        );
        METRICS.inc_refinements();
        run.warnings.extend(outcome.warnings);
        outcome.params
    }

    async fn synthesize(
        &self,
        request: &CompositionRequest,
        params: &SynthesisParams,
        cancel: &CancellationToken,
    ) -> Result<Synthesized> {
        let pool = Arc::clone(&request.pool);
        let audio = Arc::clone(&request.audio);
        let target = request.target_duration;
        let params = params.clone();
        let task =
            tokio::task::spawn_blocking(move || synthesize(&pool, &audio, target, &params));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Synthesized::Cancelled),
            joined = tokio::time::timeout(self.config.synthesis_budget(), task) => match joined {
                Err(_) => Ok(Synthesized::OverBudget),
                Ok(Err(e)) => Err(BeatcutError::CompositionFailed(format!(
                    "synthesis task failed: {e}"
                ))),
                Ok(Ok(outcome)) => outcome.map(Synthesized::Done),
            },
        }
    }

    fn context<'a>(
        &'a self,
        adapter: &'static str,
        timeout: std::time::Duration,
        cancel: &'a CancellationToken,
    ) -> CallContext<'a> {
        CallContext {
            adapter,
            timeout,
            cancel,
            limiter: &self.limiter,
        }
    }

    async fn render(
        &self,
        timeline: &Timeline,
        lookup: &AssetLookup,
        cancel: &CancellationToken,
    ) -> std::result::Result<RenderedArtifact, CallError> {
        let renderer = &self.collaborators.renderer;
        let ctx = self.context("renderer", self.config.render_timeout(), cancel);
        with_retry(&self.retry, ctx, || renderer.render(timeline, lookup, cancel)).await
    }

    async fn evaluate(
        &self,
        artifact: &RenderedArtifact,
        timeline: &Timeline,
        intent: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Evaluation, CallError> {
        let evaluator = &self.collaborators.evaluator;
        let ctx = self.context("evaluator", self.config.evaluate_timeout(), cancel);
        with_retry(&self.retry, ctx, || async move {
            let evaluation = evaluator
                .evaluate(artifact, timeline, intent, cancel)
                .await?;
            evaluation.validate().map_err(AdapterError::Malformed)?;
            Ok::<_, AdapterError>(evaluation)
        })
        .await
    }

    async fn translate(
        &self,
        input: RefinementInput<'_>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<RefinementCommand>, CallError> {
        let translator = &self.collaborators.translator;
        let ctx = self.context("translator", self.config.translate_timeout(), cancel);
        with_retry(&self.retry, ctx, || translator.translate(input, cancel)).await
    }

    /// Best-effort result after a collaborator gave up, or a hard failure
    /// when nothing was ever evaluated.
    fn degrade(&self, mut run: Run, reason: DegradeReason) -> Result<CompositionResult> {
        let Some(best) = run.state.take_best() else {
            warn!(reason = %reason, "composition failed before any evaluation");
            obs::emit_composition_finished(
                &run.request_id,
                "failed",
                run.state.iteration(),
                None,
                run.started.elapsed().as_millis() as u64,
            );
            return Err(BeatcutError::CompositionFailed(reason.to_string()));
        };
        run.state.advance(Phase::Degraded)?;
        warn!(reason = %reason, best_score = best.score(), "degrading to best timeline");
        Ok(self.finish(run, best, CompositionOutcome::Degraded { reason }))
    }

    fn cancelled(&self, mut run: Run) -> BeatcutError {
        let phase = run.state.phase();
        // Phase::Cancelled is reachable from every non-terminal phase.
        if let Err(e) = run.state.advance(Phase::Cancelled) {
            debug!(error = %e, "cancel after terminal phase");
        }
        METRICS.inc_cancelled();
        obs::emit_composition_finished(
            &run.request_id,
            Phase::Cancelled.as_str(),
            run.state.iteration(),
            run.state.best_score(),
            run.started.elapsed().as_millis() as u64,
        );
        BeatcutError::Cancelled {
            phase,
            best: run.state.take_best().map(Box::new),
        }
    }

    fn finish(
        &self,
        run: Run,
        chosen: ScoredTimeline,
        outcome: CompositionOutcome,
    ) -> CompositionResult {
        match outcome {
            CompositionOutcome::Accepted => METRICS.inc_accepted(),
            CompositionOutcome::Exhausted => METRICS.inc_exhausted(),
            CompositionOutcome::Degraded { .. } => METRICS.inc_degraded(),
        }
        obs::emit_composition_finished(
            &run.request_id,
            outcome.label(),
            run.state.iteration(),
            Some(chosen.score()),
            run.started.elapsed().as_millis() as u64,
        );
        CompositionResult {
            request_id: run.request_id,
            accepted: outcome == CompositionOutcome::Accepted,
            iterations_used: run.state.iteration(),
            timeline: chosen.timeline,
            evaluation: chosen.evaluation,
            outcome,
            history: run.history,
            warnings: run.warnings,
        }
    }
}
