//! Streaming responses as an additive capability.
//!
//! Providers that can stream implement [`StreamingLlm`] alongside
//! [`crate::llms::base::LlmProvider`]. The stream yields [`StreamChunk`]s;
//! the final `Done` chunk carries the authoritative assembled content and
//! tool calls, so an accumulator can always hand callers the same value a
//! non-streaming call would have produced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::base::LlmMessage;
use crate::errors::TroupeError;

/// One increment of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Partial text content.
    TextDelta {
        text: String,
    },
    /// Partial reasoning content; surfaced for observers, never part of
    /// the final text.
    ThinkingDelta {
        text: String,
    },
    /// Partial tool call. The first delta for an index carries `id` and
    /// `name`; later deltas append `arguments` fragments.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// Terminal chunk with the complete response.
    Done {
        content: String,
        tool_calls: Option<Vec<Value>>,
        usage: Option<StreamUsage>,
    },
    /// Terminal error.
    Error {
        message: String,
    },
}

/// Usage totals reported at the end of a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Streaming capability, implemented next to the base provider trait.
#[async_trait]
pub trait StreamingLlm: Send + Sync {
    /// Start a streaming call; chunks arrive through the returned receiver.
    async fn stream(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<Box<dyn StreamReceiver>, TroupeError>;
}

/// Source of chunks, abstracting the underlying transport.
#[async_trait]
pub trait StreamReceiver: Send + Sync {
    /// Next chunk, or `None` once the stream has ended.
    async fn next(&mut self) -> Option<StreamChunk>;
}

/// Channel-backed receiver for providers that push chunks from a
/// background task.
pub struct ChannelStreamReceiver {
    rx: tokio::sync::mpsc::Receiver<StreamChunk>,
}

impl ChannelStreamReceiver {
    /// Wrap an existing receiver.
    pub fn new(rx: tokio::sync::mpsc::Receiver<StreamChunk>) -> Self {
        Self { rx }
    }

    /// Matched sender/receiver pair.
    pub fn pair(buffer: usize) -> (tokio::sync::mpsc::Sender<StreamChunk>, Self) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl StreamReceiver for ChannelStreamReceiver {
    async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

/// Assembles the full canonical response while chunks are forwarded
/// elsewhere (console listeners, stream-chunk events).
#[derive(Default)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: Vec<Value>,
    usage: Option<StreamUsage>,
    errored: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a chunk; returns `true` when the stream is finished.
    pub fn push(&mut self, chunk: &StreamChunk) -> bool {
        match chunk {
            StreamChunk::TextDelta { text } => {
                self.text.push_str(text);
                false
            }
            StreamChunk::ThinkingDelta { .. } | StreamChunk::ToolCallDelta { .. } => false,
            StreamChunk::Done {
                content,
                tool_calls,
                usage,
            } => {
                // Done is authoritative; accumulated deltas are replaced.
                self.text = content.clone();
                if let Some(tc) = tool_calls {
                    self.tool_calls = tc.clone();
                }
                self.usage = usage.clone();
                true
            }
            StreamChunk::Error { message } => {
                self.errored = Some(message.clone());
                true
            }
        }
    }

    /// Accumulated text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Accumulated tool calls.
    pub fn tool_calls(&self) -> &[Value] {
        &self.tool_calls
    }

    /// Final usage, when the stream reported it.
    pub fn usage(&self) -> Option<&StreamUsage> {
        self.usage.as_ref()
    }

    /// Error message if the stream ended in `Error`.
    pub fn error(&self) -> Option<&str> {
        self.errored.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trips_through_serde() {
        let chunk = StreamChunk::ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("search".into()),
            arguments: Some("{\"q\":".into()),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("tool_call_delta"));
        let back: StreamChunk = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, StreamChunk::ToolCallDelta { index: 0, .. }));
    }

    #[test]
    fn done_chunk_is_authoritative() {
        let mut acc = StreamAccumulator::new();
        assert!(!acc.push(&StreamChunk::TextDelta { text: "Hel".into() }));
        assert!(!acc.push(&StreamChunk::TextDelta { text: "lo".into() }));
        assert_eq!(acc.text(), "Hello");

        let done = acc.push(&StreamChunk::Done {
            content: "Hello world".into(),
            tool_calls: Some(vec![serde_json::json!({"id": "c1"})]),
            usage: Some(StreamUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
        });
        assert!(done);
        assert_eq!(acc.text(), "Hello world");
        assert_eq!(acc.tool_calls().len(), 1);
        assert_eq!(acc.usage().unwrap().total_tokens, 5);
    }

    #[test]
    fn error_chunk_terminates() {
        let mut acc = StreamAccumulator::new();
        assert!(acc.push(&StreamChunk::Error {
            message: "timeout".into()
        }));
        assert_eq!(acc.error(), Some("timeout"));
    }

    #[test]
    fn channel_receiver_drains_then_ends() {
        tokio_test::block_on(async {
            let (tx, mut rx) = ChannelStreamReceiver::pair(8);
            tx.send(StreamChunk::TextDelta { text: "hi".into() })
                .await
                .unwrap();
            tx.send(StreamChunk::Done {
                content: "hi".into(),
                tool_calls: None,
                usage: None,
            })
            .await
            .unwrap();
            drop(tx);

            assert!(matches!(
                rx.next().await,
                Some(StreamChunk::TextDelta { .. })
            ));
            assert!(matches!(rx.next().await, Some(StreamChunk::Done { .. })));
            assert!(rx.next().await.is_none());
        });
    }
}
