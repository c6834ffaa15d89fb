//! In-memory collaborator fakes (testing only)
//!
//! Provides `StaticRenderer`, `FlakyRenderer`, `HangingRenderer`,
//! `ScriptedEvaluator` and `ScriptedTranslator`. They satisfy the adapter
//! contracts without any external process and record how often they were
//! called.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::adapters::{
    AdapterError, AdapterResult, QualityEvaluator, RefinementInput, RefinementTranslator,
    Renderer,
};
use crate::domain::{AssetLookup, Evaluation, RenderedArtifact, Timeline};
use crate::refinement::RefinementCommand;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

/// Renders instantly to a `mem://` uri.
#[derive(Debug, Default)]
pub struct StaticRenderer {
    calls: AtomicU32,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(
        &self,
        timeline: &Timeline,
        assets: &AssetLookup,
        cancel: &CancellationToken,
    ) -> AdapterResult<RenderedArtifact> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        if let Some(missing) = timeline.asset_ids().find(|id| assets.get(id).is_none()) {
            return Err(AdapterError::Rejected(format!("no source for {missing}")));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedArtifact {
            uri: format!("mem://render/{n}"),
            duration: timeline.total_duration,
        })
    }
}

/// Fails the first `failures` calls, then renders like [`StaticRenderer`].
#[derive(Debug)]
pub struct FlakyRenderer {
    failures: u32,
    calls: AtomicU32,
    inner: StaticRenderer,
}

impl FlakyRenderer {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            inner: StaticRenderer::new(),
        }
    }

    /// A renderer that never succeeds.
    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FlakyRenderer {
    async fn render(
        &self,
        timeline: &Timeline,
        assets: &AssetLookup,
        cancel: &CancellationToken,
    ) -> AdapterResult<RenderedArtifact> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(AdapterError::Unavailable(format!("render attempt {n} failed")));
        }
        self.inner.render(timeline, assets, cancel).await
    }
}

/// Never completes on its own; returns `Cancelled` once the token fires.
#[derive(Debug, Default)]
pub struct HangingRenderer {
    calls: AtomicU32,
}

impl HangingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for HangingRenderer {
    async fn render(
        &self,
        _timeline: &Timeline,
        _assets: &AssetLookup,
        cancel: &CancellationToken,
    ) -> AdapterResult<RenderedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(AdapterError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// ScriptedEvaluator
// ---------------------------------------------------------------------------

/// Returns scripted verdicts in order, repeating the last one.
#[derive(Debug)]
pub struct ScriptedEvaluator {
    script: Vec<AdapterResult<Evaluation>>,
    calls: AtomicU32,
    intents: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn new(script: Vec<AdapterResult<Evaluation>>) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns `evaluation`.
    pub fn always(evaluation: Evaluation) -> Self {
        Self::new(vec![Ok(evaluation)])
    }

    /// One verdict per score; scores below `threshold` ask for refinement.
    pub fn scores(scores: &[f64], threshold: f64) -> Self {
        Self::new(
            scores
                .iter()
                .map(|&s| Ok(Evaluation::new(s, s < threshold)))
                .collect(),
        )
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Intents passed to each call, in order.
    pub fn intents(&self) -> Vec<String> {
        lock(&self.intents).clone()
    }
}

#[async_trait]
impl QualityEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _artifact: &RenderedArtifact,
        _timeline: &Timeline,
        intent: &str,
        cancel: &CancellationToken,
    ) -> AdapterResult<Evaluation> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        lock(&self.intents).push(intent.to_string());
        let step = n.min(self.script.len().saturating_sub(1));
        self.script
            .get(step)
            .cloned()
            .unwrap_or_else(|| Err(AdapterError::Unavailable("empty script".to_string())))
    }
}

// ---------------------------------------------------------------------------
// ScriptedTranslator
// ---------------------------------------------------------------------------

/// Returns scripted command batches in order, repeating the last one.
#[derive(Debug, Default)]
pub struct ScriptedTranslator {
    script: Vec<AdapterResult<Vec<RefinementCommand>>>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedTranslator {
    pub fn new(script: Vec<AdapterResult<Vec<RefinementCommand>>>) -> Self {
        Self {
            script,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns the same batch.
    pub fn always(commands: Vec<RefinementCommand>) -> Self {
        Self::new(vec![Ok(commands)])
    }

    /// Every call returns no commands.
    pub fn silent() -> Self {
        Self::always(Vec::new())
    }

    pub fn calls(&self) -> usize {
        lock(&self.inputs).len()
    }

    /// What each call was asked to translate: `evaluation:<score>` or the
    /// free text itself.
    pub fn inputs(&self) -> Vec<String> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl RefinementTranslator for ScriptedTranslator {
    async fn translate(
        &self,
        input: RefinementInput<'_>,
        cancel: &CancellationToken,
    ) -> AdapterResult<Vec<RefinementCommand>> {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let seen = match input {
            RefinementInput::Evaluation(e) => format!("evaluation:{}", e.overall_score),
            RefinementInput::FreeText(text) => text.to_string(),
        };
        let n = {
            let mut inputs = lock(&self.inputs);
            inputs.push(seen);
            inputs.len() - 1
        };
        let step = n.min(self.script.len().saturating_sub(1));
        self.script.get(step).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, ScoredMediaAsset};

    fn timeline() -> (Timeline, AssetLookup) {
        let pool = vec![ScoredMediaAsset::image("a", 0.5)];
        let timeline = Timeline::new(Vec::new(), 10.0);
        let lookup = AssetLookup::for_ids(&pool, std::iter::empty::<&AssetId>());
        (timeline, lookup)
    }

    #[tokio::test]
    async fn test_flaky_renderer_recovers() {
        let (timeline, lookup) = timeline();
        let renderer = FlakyRenderer::new(2);
        let cancel = CancellationToken::new();
        assert!(renderer.render(&timeline, &lookup, &cancel).await.is_err());
        assert!(renderer.render(&timeline, &lookup, &cancel).await.is_err());
        assert!(renderer.render(&timeline, &lookup, &cancel).await.is_ok());
        assert_eq!(renderer.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_evaluator_repeats_last() {
        let (timeline, _) = timeline();
        let artifact = RenderedArtifact {
            uri: "mem://x".into(),
            duration: 0.0,
        };
        let evaluator = ScriptedEvaluator::scores(&[4.0, 8.0], 7.0);
        let cancel = CancellationToken::new();
        let mut scores = Vec::new();
        for _ in 0..3 {
            let e = evaluator
                .evaluate(&artifact, &timeline, "intent", &cancel)
                .await
                .unwrap();
            scores.push(e.overall_score);
        }
        assert_eq!(scores, vec![4.0, 8.0, 8.0]);
        assert_eq!(evaluator.intents().len(), 3);
    }

    #[tokio::test]
    async fn test_hanging_renderer_yields_to_cancel() {
        let (timeline, lookup) = timeline();
        let renderer = HangingRenderer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = renderer.render(&timeline, &lookup, &cancel).await.unwrap_err();
        assert_eq!(err, AdapterError::Cancelled);
    }
}
