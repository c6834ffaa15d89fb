//! Concurrent composition requests over one shared adapter limiter.
//!
//! Each submitted request runs on its own task with its own
//! `CorrectionState`; requests share nothing mutable beyond the semaphore
//! bounding in-flight collaborator calls.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapters::Collaborators;
use crate::config::EngineConfig;
use crate::controller::{CompositionRequest, CompositionResult, SelfCorrectionController};
use crate::domain::{AudioRhythmProfile, BeatcutError, Result, ScoredMediaAsset, SynthesisParams};
use crate::metrics::METRICS;

/// Runs composition requests as independent tasks.
#[derive(Debug)]
pub struct CompositionService {
    controller: SelfCorrectionController,
    defaults: SynthesisParams,
    shutdown: CancellationToken,
}

/// A submitted request.
#[derive(Debug)]
pub struct CompositionHandle {
    pub request_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<CompositionResult>>,
}

impl CompositionHandle {
    /// Ask the request to stop at its next phase boundary or in-flight call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the request's terminal result.
    pub async fn join(self) -> Result<CompositionResult> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(BeatcutError::CompositionFailed(format!(
                "composition task for {} failed: {e}",
                self.request_id
            ))),
        }
    }
}

impl CompositionService {
    /// Build a service after validating `config`.
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            controller: SelfCorrectionController::new(collaborators, config),
            defaults: config.synthesis.params(),
            shutdown: CancellationToken::new(),
        })
    }

    /// A request pre-filled with the configured synthesis defaults.
    pub fn request(
        &self,
        pool: impl Into<Arc<Vec<ScoredMediaAsset>>>,
        audio: impl Into<Arc<AudioRhythmProfile>>,
        target_duration: f64,
    ) -> CompositionRequest {
        CompositionRequest::new(pool, audio, target_duration).with_params(self.defaults.clone())
    }

    /// Spawn `request` on its own task.
    pub fn submit(&self, request: CompositionRequest) -> CompositionHandle {
        let cancel = self.shutdown.child_token();
        let request_id = request.request_id.clone();
        let controller = self.controller.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { controller.compose(request, token).await });
        CompositionHandle {
            request_id,
            cancel,
            join,
        }
    }

    /// Submit every request and wait for all of them, in submission order.
    pub async fn compose_all(
        &self,
        requests: impl IntoIterator<Item = CompositionRequest>,
    ) -> Vec<Result<CompositionResult>> {
        let handles: Vec<CompositionHandle> =
            requests.into_iter().map(|r| self.submit(r)).collect();
        futures::future::join_all(handles.into_iter().map(CompositionHandle::join)).await
    }

    /// Run `request` on the caller's task.
    pub async fn compose(&self, request: CompositionRequest) -> Result<CompositionResult> {
        self.controller
            .compose(request, self.shutdown.child_token())
            .await
    }

    /// Shared limiter for collaborator calls.
    pub fn limiter(&self) -> &Arc<Semaphore> {
        self.controller.limiter()
    }

    /// Cancel every request that is still running and flush counters.
    pub fn shutdown(&self) {
        info!(event = "service.shutdown");
        self.shutdown.cancel();
        METRICS.flush();
    }
}
