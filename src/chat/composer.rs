use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::{Chunk, ChunkStream, Conversation};
use crate::llm::CompletionClient;
use crate::router::Router;
use crate::tools::Toolbox;

/// Notice shown before a tool result.
pub fn tool_notice(tool: &str, query: Option<&str>) -> String {
    match query {
        Some(q) => format!("Using my {tool} tool for '{q}'...\n\n"),
        None => format!("Using my {tool} tool...\n\n"),
    }
}

/// Answers one user turn: either a single tool call or the model's stream, never both.
pub struct Assistant {
    router: Router,
    tools: Toolbox,
    completion: CompletionClient,
}

impl Assistant {
    pub fn new(router: Router, tools: Toolbox, completion: CompletionClient) -> Self {
        Self {
            router,
            tools,
            completion,
        }
    }

    pub fn respond(&self, conversation: &Conversation, cancel: CancellationToken) -> ChunkStream {
        let latest = conversation.latest_user_text().unwrap_or_default();

        let decision = self.router.route(latest);
        let adapter = decision.tool.and_then(|kind| {
            let found = self.tools.get(kind);
            if found.is_none() {
                warn!(tool = kind.name(), "routed to a tool that is not installed");
            }
            found
        });

        let Some(adapter) = adapter else {
            info!(model = self.completion.model(), "answering with the model");
            return self.completion.stream(conversation.turns(), cancel);
        };

        let query = decision.query;
        info!(tool = adapter.kind().name(), query = ?query, "answering with a tool");
        Box::pin(async_stream::stream! {
            yield Chunk::Text(tool_notice(adapter.kind().name(), query.as_deref()));
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                text = adapter.call(query.as_deref()) => Some(text),
            };
            if let Some(text) = result {
                yield Chunk::Text(text);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Conversation, assemble};
    use crate::config::RouterConfig;
    use crate::llm::testing::ScriptedBackend;
    use crate::tools::{ToolAdapter, ToolKind};
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    struct FakeTool {
        kind: ToolKind,
        reply: &'static str,
        calls: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait::async_trait]
    impl ToolAdapter for FakeTool {
        fn kind(&self) -> ToolKind {
            self.kind
        }

        async fn call(&self, query: Option<&str>) -> String {
            self.calls.lock().unwrap().push(query.map(str::to_string));
            self.reply.to_string()
        }
    }

    struct Fixture {
        assistant: Assistant,
        backend: Arc<ScriptedBackend>,
        calls: Arc<Mutex<Vec<Option<String>>>>,
    }

    fn fixture(backend: ScriptedBackend) -> Fixture {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tools = Toolbox::new()
            .with_adapter(FakeTool {
                kind: ToolKind::Weather,
                reply: "The current weather in Paris, France is:\n- **Temperature:** 18.4°C\n- **Wind Speed:** 11.2 km/h",
                calls: calls.clone(),
            })
            .with_adapter(FakeTool {
                kind: ToolKind::Cricket,
                reply: "The Cricket API key is not configured. Please add `CRICKET_API_KEY` to your secrets.",
                calls: calls.clone(),
            });
        let backend = Arc::new(backend);
        let completion = CompletionClient::new(backend.clone(), "m", "sys");
        let router = Router::new(&RouterConfig::default(), true).unwrap();
        Fixture {
            assistant: Assistant::new(router, tools, completion),
            backend,
            calls,
        }
    }

    async fn reply_to(f: &Fixture, text: &str) -> Vec<Chunk> {
        let mut conv = Conversation::new("Hello!");
        conv.push_user(text);
        f.assistant
            .respond(&conv, CancellationToken::new())
            .collect()
            .await
    }

    #[test]
    fn notice_text() {
        assert_eq!(
            tool_notice("get_weather", Some("Paris")),
            "Using my get_weather tool for 'Paris'...\n\n"
        );
        assert_eq!(
            tool_notice("get_cricket_score", None),
            "Using my get_cricket_score tool...\n\n"
        );
    }

    #[tokio::test]
    async fn weather_turn_is_notice_then_result() {
        let f = fixture(ScriptedBackend::replying(&["unused"]));
        let chunks = reply_to(&f, "weather in Paris").await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0],
            Chunk::Text("Using my get_weather tool for 'Paris'...\n\n".into())
        );
        assert!(chunks[1].text().contains("**Temperature:** 18.4°C"));
        assert_eq!(*f.calls.lock().unwrap(), vec![Some("Paris".to_string())]);
        assert!(f.backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cricket_without_key_reply() {
        let f = fixture(ScriptedBackend::replying(&["unused"]));
        let chunks = reply_to(&f, "cricket score").await;
        assert_eq!(
            assemble(&chunks),
            "Using my get_cricket_score tool...\n\n\
             The Cricket API key is not configured. Please add `CRICKET_API_KEY` to your secrets."
        );
        assert_eq!(*f.calls.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn plain_chat_forwards_model_stream() {
        let f = fixture(ScriptedBackend::replying(&["Why did ", "the crab ", "never share?"]));
        let chunks = reply_to(&f, "Tell me a joke").await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(assemble(&chunks), "Why did the crab never share?");
        assert!(f.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_single_fragment() {
        let f = fixture(ScriptedBackend::failing("401 Unauthorized"));
        let chunks = reply_to(&f, "Tell me a joke").await;
        assert_eq!(
            chunks,
            vec![Chunk::Failure(
                "Sorry, an error occurred: 401 Unauthorized".into()
            )]
        );
    }

    #[tokio::test]
    async fn uninstalled_tool_falls_back_to_model() {
        let f = fixture(ScriptedBackend::replying(&["From the model."]));
        let chunks = reply_to(&f, "news about rust").await;
        assert_eq!(assemble(&chunks), "From the model.");
    }

    #[tokio::test]
    async fn cancelled_tool_call_keeps_only_notice() {
        let f = fixture(ScriptedBackend::replying(&[]));
        let mut conv = Conversation::new("Hello!");
        conv.push_user("weather in Paris");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let chunks: Vec<Chunk> = f.assistant.respond(&conv, cancel).collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text().starts_with("Using my get_weather tool"));
        assert!(f.calls.lock().unwrap().is_empty());
    }
}
