//! Accumulation of streamed response fragments.

use std::future::Future;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    backend::ChunkStream,
    error::{ExtractError, Result},
};

/// Concatenates response fragments in arrival order.
///
/// Partial output is discarded when the upstream fails or the caller cancels;
/// only a stream that signals completion produces text.
#[derive(Debug, Default)]
pub struct StreamCollector {
    buffer: String,
    chunks: usize,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        self.chunks += 1;
    }

    /// Fragments accepted so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> String {
        self.buffer
    }

    fn fail(self, err: ExtractError) -> ExtractError {
        let message = match err {
            ExtractError::Stream { message, .. } => message,
            other => other.to_string(),
        };
        warn!(
            chunks_received = self.chunks,
            discarded_chars = self.buffer.len(),
            error = %message,
            "Upstream stream failed; discarding partial response"
        );
        ExtractError::stream(message, self.chunks)
    }

    /// Drain `stream` to completion.
    pub async fn collect<S>(stream: S) -> Result<String>
    where
        S: Stream<Item = Result<String>> + Unpin,
    {
        Self::collect_until(stream, std::future::pending()).await
    }

    /// Drain `stream` to completion unless `cancel` resolves first.
    pub async fn collect_until<S, C>(mut stream: S, cancel: C) -> Result<String>
    where
        S: Stream<Item = Result<String>> + Unpin,
        C: Future<Output = ()>,
    {
        let mut collector = Self::new();
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    warn!(chunks_received = collector.chunks, "Stream consumption cancelled");
                    return Err(ExtractError::Cancelled {
                        chunks_received: collector.chunks,
                    });
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => collector.push(&chunk),
                    Some(Err(err)) => return Err(collector.fail(err)),
                    None => break,
                },
            }
        }

        debug!(
            chunks = collector.chunks,
            response_chars = collector.buffer.chars().count(),
            "Stream completed"
        );
        Ok(collector.finish())
    }
}

/// Text of a `{"delta": {"text": ...}}` event payload.
///
/// Payloads that are not complete JSON, or carry no text, yield `None`.
pub fn decode_delta(payload: &[u8]) -> Option<String> {
    let event: Value = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, bytes = payload.len(), "Skipping undecodable stream event");
            return None;
        }
    };
    event
        .get("delta")
        .and_then(|delta| delta.get("text"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Adapt a stream of raw JSON event payloads into a fragment stream.
///
/// Hosted Claude-style endpoints wrap every text delta in an event envelope; this
/// keeps only the text and passes upstream errors through untouched.
pub fn text_deltas<S>(events: S) -> ChunkStream
where
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    events
        .filter_map(|event| async move {
            match event {
                Ok(payload) => decode_delta(&payload).map(Ok),
                Err(err) => Some(Err(err)),
            }
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(items: Vec<Result<String>>) -> ChunkStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_concatenates_in_order() {
        let text = StreamCollector::collect(chunks(vec![
            Ok("{\"a\"".to_string()),
            Ok(": 1}".to_string()),
        ]))
        .await
        .unwrap();
        assert_eq!(text, "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_failure_discards_partial_output() {
        let err = StreamCollector::collect(chunks(vec![
            Ok("{\"a\"".to_string()),
            Err(ExtractError::stream("connection reset", 0)),
        ]))
        .await
        .unwrap_err();

        match err {
            ExtractError::Stream {
                message,
                chunks_received,
            } => {
                assert_eq!(message, "connection reset");
                assert_eq!(chunks_received, 1);
            }
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_text() {
        let text = StreamCollector::collect(chunks(vec![])).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_stream() {
        let stalled = stream::iter(vec![Ok("{".to_string())])
            .chain(stream::pending())
            .boxed();
        let err = StreamCollector::collect_until(stalled, async {})
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled { .. }));
    }

    #[test]
    fn test_decode_delta() {
        assert_eq!(
            decode_delta(br#"{"type":"content_block_delta","delta":{"text":"Hi"}}"#),
            Some("Hi".to_string())
        );
        assert_eq!(decode_delta(br#"{"type":"message_stop"}"#), None);
        assert_eq!(decode_delta(br#"{"delta":{"te"#), None);
    }

    #[tokio::test]
    async fn test_text_deltas_skips_noise() {
        let events = stream::iter(vec![
            Ok(br#"{"type":"message_start"}"#.to_vec()),
            Ok(br#"{"delta":{"text":"{\"a\""}}"#.to_vec()),
            Ok(b"not json".to_vec()),
            Ok(br#"{"delta":{"text":": 1}"}}"#.to_vec()),
        ]);
        let text = StreamCollector::collect(text_deltas(events)).await.unwrap();
        assert_eq!(text, "{\"a\": 1}");
    }
}
