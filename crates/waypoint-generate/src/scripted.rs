//! In-process transport that replays a fixed script.
//!
//! Useful for demos and for exercising retry and cancellation paths
//! without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;
use waypoint_core::GenerationRequest;

use crate::transport::{ChunkStream, GenerationTransport, TransportError};

/// What one call to the transport does.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    /// Stream the chunks, then end cleanly.
    Succeed(Vec<String>),
    /// Stream the chunks, then fail.
    FailAfter {
        chunks: Vec<String>,
        error: TransportError,
    },
    /// Fail before any chunk.
    Refuse(TransportError),
    /// Stream the chunks, then go silent without ending.
    Stall(Vec<String>),
}

fn owned<I, S>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    chunks.into_iter().map(Into::into).collect()
}

impl ScriptedAttempt {
    pub fn succeed<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedAttempt::Succeed(owned(chunks))
    }

    pub fn fail_after<I, S>(chunks: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedAttempt::FailAfter {
            chunks: owned(chunks),
            error,
        }
    }

    pub fn refuse(error: TransportError) -> Self {
        ScriptedAttempt::Refuse(error)
    }

    pub fn stall<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedAttempt::Stall(owned(chunks))
    }
}

/// Replays [`ScriptedAttempt`]s in order, one per call.
///
/// Calls beyond the end of the script fail transiently.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedAttempt>>,
    calls: AtomicU32,
    chunk_delay: Duration,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = ScriptedAttempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
            chunk_delay: Duration::ZERO,
        }
    }

    /// Pause before each chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Attempts not yet replayed.
    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.script.lock().await.pop_front();
        debug!("Scripted call {} for request {}", call, request.id);

        let delay = self.chunk_delay;
        let attempt = next.ok_or_else(|| TransportError::transient("script exhausted"))?;

        let stream = match attempt {
            ScriptedAttempt::Succeed(chunks) => paced(stream::iter(chunks.into_iter().map(Ok)), delay),
            ScriptedAttempt::FailAfter { chunks, error } => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)));
                paced(stream::iter(items), delay)
            }
            ScriptedAttempt::Refuse(error) => return Err(error),
            ScriptedAttempt::Stall(chunks) => {
                paced(stream::iter(chunks.into_iter().map(Ok)), delay)
                    .chain(stream::pending())
                    .boxed()
            }
        };
        Ok(stream)
    }
}

fn paced<S>(items: S, delay: Duration) -> ChunkStream
where
    S: Stream<Item = Result<String, TransportError>> + Send + 'static,
{
    if delay.is_zero() {
        return items.boxed();
    }
    items
        .then(move |item| async move {
            tokio::time::sleep(delay).await;
            item
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{Profile, TierTable};

    fn request() -> GenerationRequest {
        GenerationRequest::builder()
            .profile(Profile::new().with("name", "Ada").with("industry", "Retail"))
            .tier(TierTable::standard().get("basic").unwrap().clone())
            .progress(1, 3)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_replays_in_order() {
        let transport = ScriptedTransport::new([
            ScriptedAttempt::refuse(TransportError::transient("down")),
            ScriptedAttempt::fail_after(["a"], TransportError::transient("reset")),
            ScriptedAttempt::succeed(["b", "c"]),
        ]);
        let request = request();

        assert!(transport.open(&request).await.is_err());

        let items: Vec<_> = transport.open(&request).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a".to_string()));
        assert!(items[1].is_err());

        let items: Vec<_> = transport.open(&request).await.unwrap().collect().await;
        assert_eq!(items, vec![Ok("b".to_string()), Ok("c".to_string())]);

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_transient() {
        let transport = ScriptedTransport::new(Vec::new());
        let err = transport.open(&request()).await.err().unwrap();
        assert!(err.is_transient());
    }
}
