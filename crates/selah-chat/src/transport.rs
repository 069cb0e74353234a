//! Upstream completion transport.
//!
//! [`CompletionTransport`] is the seam between the orchestrator and the
//! network. [`AnthropicTransport`] speaks the Messages API over HTTP with
//! server-sent events; tests substitute scripted transports.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use selah_core::config::UpstreamConfig;

use crate::ai_error::RawFailure;
use crate::error::ChatError;
use crate::types::{CompletionRequest, Credentials};

/// One decoded event from the upstream stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamDelta {
    Text(String),
    /// Explicit end of message.
    Stop,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, RawFailure>> + Send>>;

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Open a streaming completion. Errors before the first event are
    /// returned directly; errors mid-stream arrive as stream items.
    async fn open_stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<DeltaStream, RawFailure>;
}

// =============================================================================
// AnthropicTransport
// =============================================================================

pub struct AnthropicTransport {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
}

impl AnthropicTransport {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl CompletionTransport for AnthropicTransport {
    async fn open_stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<DeltaStream, RawFailure> {
        tracing::debug!(model = %request.model, messages = request.messages.len(), "Opening upstream stream");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &credentials.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&request.to_body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let mut failure = failure_from_error_body(&body).with_status(status.as_u16());
            failure.retry_after = retry_after;
            return Err(failure);
        }

        Ok(decode_sse(response.bytes_stream()))
    }
}

/// Parse an upstream error body such as
/// `{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}`.
fn failure_from_error_body(body: &str) -> RawFailure {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => {
            let message = v["error"]["message"].as_str().unwrap_or(body).to_string();
            match v["error"]["type"].as_str() {
                Some(kind) => RawFailure::new(message).with_marker(kind),
                None => RawFailure::new(message),
            }
        }
        Err(_) => RawFailure::new(body.to_string()),
    }
}

// =============================================================================
// SSE decoding
// =============================================================================

/// Incremental line decoder for server-sent events.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamDelta, RawFailure>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end_matches(['\r', '\n'])) {
                out.push(event);
            }
        }
        out
    }

    /// Decode whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Option<Result<StreamDelta, RawFailure>> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        parse_line(String::from_utf8_lossy(&rest).trim())
    }
}

fn parse_line(line: &str) -> Option<Result<StreamDelta, RawFailure>> {
    // `event:` lines repeat the `type` field of the following data line
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable SSE data line");
            return None;
        }
    };

    match parsed["type"].as_str()? {
        "content_block_delta" => {
            let delta = &parsed["delta"];
            if delta["type"].as_str() == Some("text_delta") {
                delta["text"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .map(|t| Ok(StreamDelta::Text(t.to_string())))
            } else {
                None
            }
        }
        "message_stop" => Some(Ok(StreamDelta::Stop)),
        "error" => {
            let message = parsed["error"]["message"]
                .as_str()
                .unwrap_or("upstream stream error");
            let mut failure = RawFailure::new(message);
            if let Some(kind) = parsed["error"]["type"].as_str() {
                failure = failure.with_marker(kind);
            }
            Some(Err(failure))
        }
        _ => None,
    }
}

struct DecodeState<S> {
    inner: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamDelta, RawFailure>>,
    done: bool,
}

/// Turn a raw byte stream into a [`DeltaStream`].
pub fn decode_sse<S, B, E>(inner: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RawFailure> + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(inner),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => st.pending.extend(st.decoder.push(bytes.as_ref())),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.done = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_EVENT: &str = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n";
    const STOP_EVENT: &str = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";

    // ---- Decoder ----

    #[test]
    fn test_decode_text_and_stop() {
        let mut dec = SseDecoder::new();
        let mut events = dec.push(TEXT_EVENT.as_bytes());
        events.extend(dec.push(STOP_EVENT.as_bytes()));
        assert_eq!(
            events,
            vec![Ok(StreamDelta::Text("Hello".to_string())), Ok(StreamDelta::Stop)]
        );
    }

    #[test]
    fn test_decode_split_across_chunks() {
        let mut dec = SseDecoder::new();
        let bytes = TEXT_EVENT.as_bytes();
        let (a, b) = bytes.split_at(40);
        assert!(dec.push(a).is_empty());
        assert_eq!(dec.push(b), vec![Ok(StreamDelta::Text("Hello".to_string()))]);
    }

    #[test]
    fn test_decode_multibyte_split() {
        let event = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"señor\"}}\n";
        let bytes = event.as_bytes();
        let split = event.find('ñ').unwrap() + 1;
        let mut dec = SseDecoder::new();
        assert!(dec.push(&bytes[..split]).is_empty());
        assert_eq!(dec.push(&bytes[split..]), vec![Ok(StreamDelta::Text("señor".to_string()))]);
    }

    #[test]
    fn test_decode_ignores_other_events() {
        let mut dec = SseDecoder::new();
        let input = "event: ping\ndata: {\"type\":\"ping\"}\n\n: comment\ndata: not json\n\n";
        assert!(dec.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_decode_error_event() {
        let mut dec = SseDecoder::new();
        let input = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n";
        let events = dec.push(input.as_bytes());
        let failure = events[0].clone().unwrap_err();
        assert_eq!(failure.message, "Overloaded");
        assert_eq!(failure.marker.as_deref(), Some("overloaded_error"));
    }

    #[test]
    fn test_error_body_parsing() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let failure = failure_from_error_body(body);
        assert_eq!(failure.marker.as_deref(), Some("authentication_error"));
        assert_eq!(failure.message, "invalid x-api-key");
        assert_eq!(failure_from_error_body("gateway down").message, "gateway down");
    }

    // ---- Stream adapter ----

    #[tokio::test]
    async fn test_decode_sse_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(TEXT_EVENT.as_bytes().to_vec()),
            Ok(STOP_EVENT.as_bytes().to_vec()),
        ];
        let items: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;
        assert_eq!(
            items,
            vec![Ok(StreamDelta::Text("Hello".to_string())), Ok(StreamDelta::Stop)]
        );
    }

    #[tokio::test]
    async fn test_decode_sse_stream_error_ends_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(TEXT_EVENT.as_bytes().to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(STOP_EVENT.as_bytes().to_vec()),
        ];
        let items: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_decode_sse_trailing_line_without_newline() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"data: {\"type\":\"message_stop\"}".to_vec())];
        let items: Vec<_> = decode_sse(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items, vec![Ok(StreamDelta::Stop)]);
    }
}
