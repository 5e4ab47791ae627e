//! HTTP transport for the generation service.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use waypoint_core::{
    AggregateScores, GenerationOptions, GenerationRequest, Profile, Result, WaypointError,
};
use waypoint_generate::{ChunkStream, GenerationTransport, TransportError};

use crate::config::ClientConfig;

/// Streams generations from `{base_url}/v1/generate`.
///
/// The response body is forwarded as UTF-8 text as it arrives. Failures
/// are classified from the HTTP status and the service's error code.
#[derive(Clone)]
pub struct HttpTransport {
    /// Endpoint URL.
    endpoint: String,

    /// Bearer token.
    api_key: Option<String>,

    /// HTTP client.
    http_client: reqwest::Client,
}

/// Request body sent to the service.
#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    request_id: Uuid,
    profile: &'a Profile,
    tier: &'a str,
    scoring_multiplier: f64,
    completed_steps: u32,
    total_steps: u32,
    scores: &'a AggregateScores,
    options: &'a GenerationOptions,
    stream: bool,
}

impl<'a> From<&'a GenerationRequest> for GenerateBody<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            request_id: request.id,
            profile: &request.profile,
            tier: &request.tier.id,
            scoring_multiplier: request.tier.scoring_multiplier,
            completed_steps: request.completed_count,
            total_steps: request.total_count,
            scores: &request.scores,
            options: &request.options,
            stream: true,
        }
    }
}

/// Error document returned with a non-success status.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpTransport {
    /// Build a transport from its configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| WaypointError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    /// Build a transport from `WAYPOINT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationTransport for HttpTransport {
    async fn open(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<ChunkStream, TransportError> {
        let mut call = self
            .http_client
            .post(&self.endpoint)
            .json(&GenerateBody::from(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| TransportError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }
        debug!("Generation {} connected ({})", request.id, status);

        let body = response.bytes_stream().boxed();
        let chunks = futures::stream::unfold(
            (body, Utf8Decoder::default(), false),
            |(mut body, mut decoder, done)| async move {
                if done {
                    return None;
                }
                loop {
                    match body.next().await {
                        Some(Ok(bytes)) => match decoder.push(&bytes) {
                            Ok(text) if text.is_empty() => continue,
                            Ok(text) => return Some((Ok(text), (body, decoder, false))),
                            Err(e) => return Some((Err(e), (body, decoder, true))),
                        },
                        Some(Err(e)) => {
                            let err = TransportError::transient(format!("response body: {}", e));
                            return Some((Err(err), (body, decoder, true)));
                        }
                        None => {
                            return match decoder.finish() {
                                Ok(()) => None,
                                Err(e) => Some((Err(e), (body, decoder, true))),
                            }
                        }
                    }
                }
            },
        );

        Ok(chunks.boxed())
    }
}

/// Classify a non-success response.
///
/// A `validation_error` code or a non-retryable 4xx status is a rejection;
/// everything else is transient.
fn classify_failure(status: u16, body: &str) -> TransportError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.code,
            envelope
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {}", status)),
        ),
        Err(_) => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, trimmed.chars().take(200).collect::<String>())
            };
            (None, message)
        }
    };

    let by_status = TransportError::from_status(status, message.clone());
    match code {
        Some(code) => {
            let by_code = TransportError::from_code(code, message);
            if by_code.is_transient() && !by_status.is_transient() {
                TransportError {
                    code: by_code.code,
                    ..by_status
                }
            } else {
                by_code
            }
        }
        None => by_status,
    }
}

/// Reassembles UTF-8 sequences split across network frames.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Append bytes and return every complete character decoded so far.
    fn push(&mut self, bytes: &[u8]) -> std::result::Result<String, TransportError> {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            // An incomplete trailing sequence; keep it for the next frame.
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                Ok(text)
            }
            Err(e) => Err(TransportError::transient(format!(
                "invalid UTF-8 in response: {}",
                e
            ))),
        }
    }

    /// Fails if the body ended mid-character.
    fn finish(&self) -> std::result::Result<(), TransportError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(TransportError::transient(format!(
                "response ended inside a UTF-8 sequence ({} dangling bytes)",
                self.pending.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::TierTable;
    use waypoint_generate::FailureClass;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest::builder()
            .profile(Profile::new().with("name", "Ada").with("industry", "Retail"))
            .tier(TierTable::standard().get("professional").unwrap().clone())
            .progress(4, 6)
            .build()
            .unwrap()
    }

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(&ClientConfig::new(server.uri()).with_api_key("test-key")).unwrap()
    }

    async fn collect_text(stream: ChunkStream) -> std::result::Result<String, TransportError> {
        let mut text = String::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    #[tokio::test]
    async fn test_streams_body_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Plano\nRelatório pronto."))
            .expect(1)
            .mount(&server)
            .await;

        let stream = transport(&server).open(&request()).await.unwrap();
        let text = collect_text(stream).await.unwrap();

        assert_eq!(text, "# Plano\nRelatório pronto.");
    }

    #[tokio::test]
    async fn test_sends_request_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let request = request();
        let stream = transport(&server).open(&request).await.unwrap();
        collect_text(stream).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["tier"], "professional");
        assert_eq!(body["completed_steps"], 4);
        assert_eq!(body["total_steps"], 6);
        assert_eq!(body["profile"]["industry"], "Retail");
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_validation_code_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "error": {"code": "validation_error", "message": "industry is required"}
            })))
            .mount(&server)
            .await;

        let err = transport(&server).open(&request()).await.err().unwrap();

        assert_eq!(err.class, FailureClass::Validation);
        assert_eq!(err.code.as_deref(), Some("validation_error"));
        assert_eq!(err.message, "industry is required");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let err = transport(&server).open(&request()).await.err().unwrap();

        assert!(err.is_transient());
        assert_eq!(err.message, "HTTP 503: upstream overloaded");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let transport = HttpTransport::new(&ClientConfig::new(uri)).unwrap();
        let err = transport.open(&request()).await.err().unwrap();

        assert!(err.is_transient());
    }

    #[test]
    fn test_classification_prefers_rejection() {
        let err = classify_failure(400, r#"{"error": {"code": "overloaded", "message": "m"}}"#);
        assert_eq!(err.class, FailureClass::Validation);
        assert_eq!(err.code.as_deref(), Some("overloaded"));

        let err = classify_failure(500, r#"{"error": {"code": "validation_error"}}"#);
        assert_eq!(err.class, FailureClass::Validation);
        assert_eq!(err.message, "HTTP 500");

        let err = classify_failure(429, "");
        assert!(err.is_transient());
    }

    #[test]
    fn test_decoder_reassembles_split_characters() {
        let bytes = "Relatório ✓".as_bytes();
        let split = bytes.len() - 2;
        let mut decoder = Utf8Decoder::default();

        let first = decoder.push(&bytes[..split]).unwrap();
        let second = decoder.push(&bytes[split..]).unwrap();

        assert_eq!(first, "Relatório ");
        assert_eq!(second, "✓");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_rejects_truncated_and_invalid_input() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[0xE2, 0x9C]).unwrap(), "");
        assert!(decoder.finish().is_err());

        let mut decoder = Utf8Decoder::default();
        assert!(decoder.push(&[b'a', 0xFF, b'b']).is_err());
    }
}
