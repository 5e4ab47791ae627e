//! At most one active generation per slot.

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;
use waypoint_core::GenerationRequest;

use crate::pipeline::{CancelToken, GenerationHandle, GenerationPipeline};
use crate::transport::GenerationTransport;

/// Holds the most recent generation for one session.
///
/// Starting a new generation cancels the previous one, so concurrent
/// requests for the same session never race.
#[derive(Default)]
pub struct GenerationSlot {
    active: Mutex<Option<(Uuid, CancelToken)>>,
}

impl GenerationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the active generation, if any, and start `request`.
    pub async fn start<T: GenerationTransport>(
        &self,
        pipeline: &GenerationPipeline<T>,
        request: GenerationRequest,
    ) -> GenerationHandle {
        let mut active = self.active.lock().await;
        if let Some((previous, token)) = active.take() {
            if !token.is_cancelled() {
                info!("Superseding generation {} with {}", previous, request.id);
                token.cancel();
            }
        }

        let handle = pipeline.generate(request);
        *active = Some((handle.request_id(), handle.cancel_token()));
        handle
    }

    /// Cancel the active generation. Returns its id, if there was one.
    pub async fn cancel_active(&self) -> Option<Uuid> {
        let mut active = self.active.lock().await;
        active.take().map(|(id, token)| {
            token.cancel();
            id
        })
    }

    /// Id of the most recently started generation.
    pub async fn active_request(&self) -> Option<Uuid> {
        self.active.lock().await.as_ref().map(|(id, _)| *id)
    }
}
