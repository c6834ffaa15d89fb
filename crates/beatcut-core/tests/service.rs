//! Concurrent requests through `CompositionService`, plus artifact
//! persistence of their results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beatcut_core::adapters::AdapterResult;
use beatcut_core::fakes::{HangingRenderer, ScriptedEvaluator, ScriptedTranslator, StaticRenderer};
use beatcut_core::{
    read_composition_artifact, write_composition_artifact, AssetLookup, AudioRhythmProfile,
    BeatcutError, Collaborators, CompositionService, EngineConfig, Evaluation, RefinementCommand,
    RenderedArtifact, Renderer, ScoredMediaAsset, Timeline,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn pool() -> Vec<ScoredMediaAsset> {
    (0..8)
        .map(|i| ScoredMediaAsset::image(format!("img-{i}"), 0.5 + i as f64 * 0.05))
        .collect()
}

fn audio() -> AudioRhythmProfile {
    AudioRhythmProfile {
        duration: 60.0,
        tempo_bpm: 120.0,
        beats: (0..120).map(|i| i as f64 * 0.5).collect(),
        energy_curve: vec![0.5],
    }
}

fn config(max_inflight: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.concurrency.max_inflight_adapter_calls = max_inflight;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

fn accepting(renderer: Arc<dyn Renderer>) -> Collaborators {
    Collaborators::new(
        renderer,
        Arc::new(ScriptedEvaluator::always(Evaluation::new(8.0, false))),
        Arc::new(ScriptedTranslator::silent()),
    )
}

/// Holds each render for a while and records peak concurrency.
#[derive(Default)]
struct SlowRenderer {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Renderer for SlowRenderer {
    async fn render(
        &self,
        timeline: &Timeline,
        _assets: &AssetLookup,
        _cancel: &CancellationToken,
    ) -> AdapterResult<RenderedArtifact> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(RenderedArtifact {
            uri: "mem://slow".into(),
            duration: timeline.total_duration,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limiter_bounds_inflight_renders() {
    let renderer = Arc::new(SlowRenderer::default());
    let service = CompositionService::new(accepting(renderer.clone()), &config(2)).unwrap();
    let pool = Arc::new(pool());
    let audio = Arc::new(audio());

    let requests: Vec<_> = (0..6)
        .map(|i| {
            service
                .request(Arc::clone(&pool), Arc::clone(&audio), 10.0)
                .with_request_id(format!("req-{i}"))
        })
        .collect();
    let results = service.compose_all(requests).await;

    assert_eq!(results.len(), 6);
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.request_id, format!("req-{i}"));
        assert!(result.accepted);
    }
    let peak = renderer.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak {peak}");
    assert_eq!(service.limiter().available_permits(), 2);
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_params() {
    let translator = Arc::new(ScriptedTranslator::always(vec![
        RefinementCommand::AdjustPacing {
            speed_multiplier: 1.25,
        },
    ]));
    let collaborators = Collaborators::new(
        Arc::new(StaticRenderer::new()),
        Arc::new(ScriptedEvaluator::always(Evaluation::new(8.0, false))),
        translator,
    );
    let service = CompositionService::new(collaborators, &config(4)).unwrap();

    let plain = service.submit(service.request(pool(), audio(), 20.0));
    let slowed = service.submit(
        service
            .request(pool(), audio(), 20.0)
            .with_feedback("slower please"),
    );

    let plain = plain.join().await.unwrap();
    let slowed = slowed.join().await.unwrap();
    assert_eq!(plain.timeline.segments.len(), 10);
    assert_eq!(slowed.timeline.segments.len(), 8);
}

#[tokio::test]
async fn handle_cancel_stops_only_its_request() {
    let service =
        CompositionService::new(accepting(Arc::new(HangingRenderer::new())), &config(4)).unwrap();

    let first = service.submit(service.request(pool(), audio(), 10.0));
    let second = service.submit(service.request(pool(), audio(), 10.0));
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.cancel();

    let err = first.join().await.unwrap_err();
    assert!(matches!(err, BeatcutError::Cancelled { .. }));
    assert!(!second.is_finished());

    second.cancel();
    assert!(matches!(
        second.join().await.unwrap_err(),
        BeatcutError::Cancelled { .. }
    ));
}

#[tokio::test]
async fn shutdown_cancels_everything_in_flight() {
    let service =
        CompositionService::new(accepting(Arc::new(HangingRenderer::new())), &config(4)).unwrap();
    let handles: Vec<_> = (0..3)
        .map(|_| service.submit(service.request(pool(), audio(), 10.0)))
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    service.shutdown();

    for handle in handles {
        assert!(matches!(
            handle.join().await.unwrap_err(),
            BeatcutError::Cancelled { .. }
        ));
    }
}

#[test]
fn invalid_config_is_rejected() {
    let mut bad = EngineConfig::default();
    bad.controller.score_threshold = 11.0;
    let err = CompositionService::new(accepting(Arc::new(StaticRenderer::new())), &bad)
        .unwrap_err();
    assert!(matches!(err, BeatcutError::Config(_)));
}

#[tokio::test]
async fn artifact_round_trips_and_detects_tampering() {
    let service =
        CompositionService::new(accepting(Arc::new(StaticRenderer::new())), &config(2)).unwrap();
    let result = service
        .compose(
            service
                .request(pool(), audio(), 12.0)
                .with_request_id("req-artifact"),
        )
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let path = write_composition_artifact(&result, dir.path()).unwrap();
    assert!(path.ends_with("req-artifact/composition.json"));

    let restored = read_composition_artifact("req-artifact", dir.path()).unwrap();
    assert_eq!(restored, result);

    let mut tampered = std::fs::read_to_string(&path).unwrap();
    tampered = tampered.replacen("img-", "imx-", 1);
    std::fs::write(&path, tampered).unwrap();
    let err = read_composition_artifact("req-artifact", dir.path()).unwrap_err();
    assert!(matches!(err, BeatcutError::DigestMismatch { .. }));
}

#[test]
fn config_file_with_env_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("beatcut.toml");
    std::fs::write(
        &path,
        "[controller]\nmax_iterations = 5\n\n[retry]\nmax_attempts = 2\n",
    )
    .unwrap();

    let mut config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.controller.max_iterations, 5);
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.controller.score_threshold, 7.0);

    config
        .apply_env_from(|key| (key == "BEATCUT_SCORE_THRESHOLD").then(|| "8.5".to_string()))
        .unwrap();
    assert_eq!(config.controller.score_threshold, 8.5);
    config.validate().unwrap();
}
