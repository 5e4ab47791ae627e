//! Streamed generation with bounded retry and cancellation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use waypoint_core::{GenerationRequest, Report, Result, WaypointError};

use crate::attempt::GenerationAttempt;
use crate::config::PipelineConfig;
use crate::event::GenerationEvent;
use crate::machine::{PipelineMachine, PipelineState, RetryPolicy};
use crate::transport::{ChunkStream, GenerationTransport, TransportError};

/// Cancels one generation.
///
/// Cancelling is idempotent. Cancelling a generation that already delivered
/// its terminal event has no effect.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { signal: Arc::new(tx) }, rx)
    }

    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Runs generation requests against a transport.
pub struct GenerationPipeline<T: GenerationTransport> {
    transport: Arc<T>,
    config: PipelineConfig,
}

impl<T: GenerationTransport> Clone for GenerationPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: GenerationTransport> GenerationPipeline<T> {
    /// Create a pipeline with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, PipelineConfig::default())
    }

    pub fn with_config(transport: T, config: PipelineConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    /// Create a pipeline over a transport shared with other owners.
    pub fn from_shared(transport: Arc<T>, config: PipelineConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Start a generation on the current tokio runtime.
    ///
    /// The request is validated before any call is made; a rejected request
    /// yields a single `Failed` event. Dropping the returned handle cancels
    /// the generation.
    pub fn generate(&self, request: GenerationRequest) -> GenerationHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (token, cancel) = CancelToken::new();
        let request_id = request.id;

        let run = Run {
            transport: self.transport.clone(),
            request,
            machine: PipelineMachine::new(RetryPolicy::from(&self.config)),
            idle_timeout: self.config.idle_timeout(),
            events: tx,
            cancel,
        };
        tokio::spawn(run.execute());

        GenerationHandle {
            request_id,
            events: ReceiverStream::new(rx),
            cancel: token,
            finished: false,
        }
    }
}

/// The caller's end of one generation.
///
/// Yields events in order and ends right after the terminal event. Once
/// cancelled, buffered non-terminal events are skipped.
pub struct GenerationHandle {
    request_id: Uuid,
    events: ReceiverStream<GenerationEvent>,
    cancel: CancelToken,
    finished: bool,
}

impl GenerationHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Request cancellation. The stream still ends with one terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that can cancel this generation from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drain the stream and return the outcome.
    pub async fn wait(mut self) -> Result<Report> {
        while let Some(event) = self.next().await {
            match event {
                GenerationEvent::Succeeded(report) => return Ok(report),
                GenerationEvent::Failed(err) => return Err(err),
                _ => {}
            }
        }
        Err(WaypointError::Internal(format!(
            "generation {} ended without a terminal event",
            self.request_id
        )))
    }
}

impl Stream for GenerationHandle {
    type Item = GenerationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut this.events).poll_next(cx) {
                Poll::Ready(Some(event)) if event.is_terminal() => {
                    this.finished = true;
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(Some(_)) if this.cancel.is_cancelled() => continue,
                Poll::Ready(Some(event)) => return Poll::Ready(Some(event)),
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// State owned by the spawned generation task.
struct Run<T: GenerationTransport> {
    transport: Arc<T>,
    request: GenerationRequest,
    machine: PipelineMachine,
    idle_timeout: Option<Duration>,
    events: mpsc::Sender<GenerationEvent>,
    cancel: watch::Receiver<bool>,
}

impl<T: GenerationTransport> Run<T> {
    async fn execute(mut self) {
        let id = self.request.id;
        let event = match self.drive().await {
            Ok(report) => {
                info!(
                    "Generation {} succeeded on attempt {} ({} chars)",
                    id,
                    report.attempts,
                    report.char_count()
                );
                GenerationEvent::Succeeded(report)
            }
            Err(err) if err.is_cancelled() => {
                info!("Generation {} cancelled", id);
                GenerationEvent::Failed(err)
            }
            Err(err) => {
                error!("Generation {} failed: {}", id, err);
                GenerationEvent::Failed(err)
            }
        };

        if self.events.send(event).await.is_err() {
            debug!("Generation {} finished after its handle was dropped", id);
        }
    }

    async fn drive(&mut self) -> Result<Report> {
        self.request.validate()?;

        let max_attempts = self.machine.policy().max_attempts;
        let delay = self.machine.policy().delay;
        self.machine.start();

        loop {
            let number = match self.machine.state() {
                PipelineState::Attempting(n) => n,
                other => {
                    return Err(WaypointError::Internal(format!(
                        "unexpected pipeline state {:?}",
                        other
                    )))
                }
            };

            info!(
                "Generation {} attempt {}/{}",
                self.request.id, number, max_attempts
            );
            self.emit(GenerationEvent::Attempting {
                attempt: number,
                max_attempts,
            })
            .await?;

            let failure = match self.run_attempt(number).await? {
                Ok(text) => {
                    self.machine.stream_finished();
                    return Ok(Report::new(self.request.id, text, number));
                }
                Err(failure) => failure,
            };

            if !failure.is_transient() {
                self.machine.rejected();
                return Err(WaypointError::rejected(failure.message));
            }

            match self.machine.transient_failure() {
                PipelineState::Retrying(next) => {
                    warn!(
                        "Generation {} attempt {}/{} failed: {}; retrying in {:?}",
                        self.request.id, number, max_attempts, failure.message, delay
                    );
                    self.emit(GenerationEvent::Retrying {
                        attempt: next,
                        max_attempts,
                        reason: failure.message,
                    })
                    .await?;
                    self.backoff(delay).await?;
                    self.machine.backoff_elapsed();
                }
                _ => {
                    return Err(WaypointError::TransientGeneration {
                        attempts: number,
                        message: failure.message,
                    })
                }
            }
        }
    }

    /// Run one attempt. The outer error is cancellation; the inner one is
    /// the attempt's own failure.
    async fn run_attempt(
        &mut self,
        number: u32,
    ) -> Result<std::result::Result<String, TransportError>> {
        let mut attempt = GenerationAttempt::new(number);

        let opened = tokio::select! {
            biased;
            _ = interrupted(&mut self.cancel, &self.events) => None,
            opened = self.transport.open(&self.request) => Some(opened),
        };
        let mut stream = match opened {
            None => return Err(self.interrupt()),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                attempt.fail(e.clone());
                return Ok(Err(e));
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = interrupted(&mut self.cancel, &self.events) => None,
                next = next_chunk(&mut stream, self.idle_timeout) => Some(next),
            };

            match next {
                None => return Err(self.interrupt()),
                Some(Ok(Some(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    if attempt.push(&text) {
                        self.machine.chunk_received();
                        debug!("Generation {} attempt {} streaming", self.request.id, number);
                    }
                    self.emit(GenerationEvent::Chunk {
                        attempt: number,
                        text,
                    })
                    .await?;
                }
                Some(Ok(None)) => break,
                Some(Err(e)) => {
                    attempt.fail(e.clone());
                    return Ok(Err(e));
                }
            }
        }

        Ok(attempt.finish().map(|()| attempt.into_text()))
    }

    async fn emit(&mut self, event: GenerationEvent) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(self.interrupt());
        }

        let delivered = tokio::select! {
            biased;
            _ = wait_cancelled(&mut self.cancel) => false,
            sent = self.events.send(event) => sent.is_ok(),
        };
        if delivered {
            Ok(())
        } else {
            Err(self.interrupt())
        }
    }

    async fn backoff(&mut self, delay: Duration) -> Result<()> {
        let cancelled = tokio::select! {
            biased;
            _ = interrupted(&mut self.cancel, &self.events) => true,
            _ = tokio::time::sleep(delay) => false,
        };
        if cancelled {
            Err(self.interrupt())
        } else {
            Ok(())
        }
    }

    fn interrupt(&mut self) -> WaypointError {
        self.machine.cancel();
        WaypointError::Cancelled
    }
}

async fn next_chunk(
    stream: &mut ChunkStream,
    idle_timeout: Option<Duration>,
) -> std::result::Result<Option<String>, TransportError> {
    let item = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| {
                TransportError::transient(format!("no data received for {}ms", limit.as_millis()))
            })?,
        None => stream.next().await,
    };
    item.transpose()
}

/// Resolves once the token is cancelled or every token has been dropped.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await.map(|_| ());
}

/// Resolves on cancellation or once the handle's receiver is gone.
async fn interrupted(cancel: &mut watch::Receiver<bool>, events: &mpsc::Sender<GenerationEvent>) {
    tokio::select! {
        _ = wait_cancelled(cancel) => {}
        _ = events.closed() => {}
    }
}
