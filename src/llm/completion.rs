use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::{Chunk, ChunkStream, Turn};
use crate::llm::stream::TextStream;
use crate::llm::types::ChatMessage;
use crate::llm::{LlmErrorKind, OpenAIClient, classify_error};

/// Seam between the completion client and the wire. Tests swap in a scripted backend.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<TextStream>;
}

#[async_trait::async_trait]
impl ChatBackend for OpenAIClient {
    async fn open_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        self.chat_stream(model, messages, Some(cancel)).await
    }
}

/// Streams model replies for turns the router did not claim.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
    system_prompt: String,
}

pub fn error_reply(err: &anyhow::Error) -> String {
    format!("Sorry, an error occurred: {err:#}")
}

impl CompletionClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The request payload: one system message followed by the whole conversation.
    pub fn build_messages(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(self.system_prompt.clone()))
            .chain(turns.iter().map(ChatMessage::from))
            .collect()
    }

    /// Never fails: a request error becomes a single [`Chunk::Failure`] and ends the stream.
    /// Cancellation ends the stream quietly.
    pub fn stream(&self, turns: &[Turn], cancel: CancellationToken) -> ChunkStream {
        let messages = self.build_messages(turns);
        let backend = Arc::clone(&self.backend);
        let model = self.model.clone();

        Box::pin(async_stream::stream! {
            let mut upstream = match backend.open_stream(&model, messages, cancel.clone()).await {
                Ok(s) => s,
                Err(e) => {
                    let kind = classify_error(None, &e);
                    if kind != LlmErrorKind::Cancelled {
                        warn!(kind=?kind, err=%format!("{e:#}"), "completion request failed");
                        yield Chunk::Failure(error_reply(&e));
                    }
                    return;
                }
            };

            let mut produced = false;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => {
                        produced = true;
                        yield Chunk::Text(text);
                    }
                    Err(e) => {
                        warn!(err=%format!("{e:#}"), "completion stream failed");
                        yield Chunk::Failure(error_reply(&e));
                        return;
                    }
                }
            }

            if !produced && !cancel.is_cancelled() {
                let e = anyhow::Error::new(LlmErrorKind::EmptyReply);
                warn!("completion stream ended without content");
                yield Chunk::Failure(error_reply(&e));
            }
            debug!("completion stream finished");
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use crate::chat::Conversation;

    fn client(backend: ScriptedBackend) -> (CompletionClient, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (
            CompletionClient::new(backend.clone(), "test-model", "You are ByteAgent."),
            backend,
        )
    }

    async fn collect(stream: ChunkStream) -> Vec<Chunk> {
        stream.collect().await
    }

    #[tokio::test]
    async fn prepends_system_prompt_and_forwards_fragments() {
        let (client, backend) = client(ScriptedBackend::replying(&["Why ", "", "not?"]));
        let mut conv = Conversation::new("Hello!");
        conv.push_user("Tell me a joke");

        let chunks = collect(client.stream(conv.turns(), CancellationToken::new())).await;
        assert_eq!(
            chunks,
            vec![Chunk::Text("Why ".into()), Chunk::Text("not?".into())]
        );

        let seen = backend.seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], ChatMessage::system("You are ByteAgent."));
        assert_eq!(sent[1].role, "assistant");
        assert_eq!(sent[2].role, "user");
        assert_eq!(sent[2].content, "Tell me a joke");
    }

    #[tokio::test]
    async fn request_failure_is_one_error_fragment() {
        let (client, _) = client(ScriptedBackend::failing("connection refused"));
        let chunks = collect(client.stream(&[], CancellationToken::new())).await;
        assert_eq!(
            chunks,
            vec![Chunk::Failure(
                "Sorry, an error occurred: connection refused".into()
            )]
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_stops_after_error_fragment() {
        let (client, _) = client(ScriptedBackend::breaking_after(&["partial"], "reset by peer"));
        let chunks = collect(client.stream(&[], CancellationToken::new())).await;
        assert_eq!(
            chunks,
            vec![
                Chunk::Text("partial".into()),
                Chunk::Failure("Sorry, an error occurred: reset by peer".into()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_reply_is_reported() {
        let (client, _) = client(ScriptedBackend::replying(&[]));
        let chunks = collect(client.stream(&[], CancellationToken::new())).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_failure());
    }

    #[tokio::test]
    async fn cancelled_open_ends_quietly() {
        struct Cancelled;
        #[async_trait::async_trait]
        impl ChatBackend for Cancelled {
            async fn open_stream(
                &self,
                _model: &str,
                _messages: Vec<ChatMessage>,
                _cancel: CancellationToken,
            ) -> Result<TextStream> {
                Err(anyhow::Error::new(LlmErrorKind::Cancelled))
            }
        }
        let client = CompletionClient::new(Arc::new(Cancelled), "m", "sys");
        let chunks = collect(client.stream(&[], CancellationToken::new())).await;
        assert!(chunks.is_empty());
    }
}
