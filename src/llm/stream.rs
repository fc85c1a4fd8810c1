use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::client_core::OpenAIClient;
use crate::llm::types::{ChatMessage, ChatRequest, ChatStreamChunk};
use crate::llm::{LlmErrorKind, classify_error};

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Outcome of one SSE line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Delta(Vec<String>),
    Done,
    Skip,
}

/// Parse one line of an OpenAI-compatible `text/event-stream` body.
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let s = line.trim();
    if s.is_empty() || s.starts_with(':') {
        return SseLine::Skip;
    }
    let payload = match s.strip_prefix("data:") {
        Some(rest) => rest.trim(),
        // event:/id:/retry: fields carry nothing we render
        None if s.contains(':') && !s.starts_with('{') => return SseLine::Skip,
        None => s,
    };
    if payload == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatStreamChunk>(payload) {
        Ok(json) => SseLine::Delta(
            json.choices
                .into_iter()
                .filter_map(|ch| ch.delta.content)
                .filter(|d| !d.is_empty())
                .collect(),
        ),
        Err(e) => {
            warn!(payload, err=%e, "failed to parse stream chunk");
            SseLine::Skip
        }
    }
}

impl OpenAIClient {
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        cancel: Option<CancellationToken>,
    ) -> Result<TextStream> {
        let url = self.endpoint();
        let req = ChatRequest {
            model: model.to_string(),
            messages,
            temperature: None,
            stream: Some(true),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .context("api key is not a valid header value")?,
        );

        debug!(endpoint=%url, model, messages = req.messages.len(), "sending chat.completions request (stream)");

        let cancel_token = cancel.unwrap_or_default();

        // Only retry establishing the stream, not mid-stream reads
        let mut attempt = 1usize;
        let max_attempts = self.llm_cfg.max_retries.saturating_add(1);
        let resp = loop {
            let fut = self
                .inner
                .post(url.clone())
                .headers(headers.clone())
                .json(&req)
                .send();

            let resp_res = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("chat_stream cancelled before send");
                    return Err(anyhow::Error::new(LlmErrorKind::Cancelled));
                }
                res = fut => res,
            };

            let (err, retry_after) = match resp_res {
                Ok(resp) if resp.status().is_success() => break resp,
                Ok(resp) => {
                    let status = resp.status();
                    let retry_after = resp
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    let text = resp.text().await.unwrap_or_default();
                    let e = anyhow::anyhow!("chat error: {} - {}", status, text);
                    let kind = classify_error(Some(status), &e);
                    (e.context(kind), retry_after)
                }
                Err(e) => {
                    let e = anyhow::Error::new(e);
                    let kind = classify_error(None, &e);
                    (e.context(kind), None)
                }
            };

            let kind = classify_error(None, &err);
            if attempt < max_attempts && self.should_retry(&kind) {
                let wait = self.backoff_delay(attempt, retry_after);
                warn!(attempt, kind=?kind, err=%err, wait_ms=%wait.as_millis(), "retrying stream establish");
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("chat_stream cancelled during retry sleep");
                        return Err(anyhow::Error::new(LlmErrorKind::Cancelled));
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
                attempt += 1;
                continue;
            }
            return Err(err);
        };

        let mut byte_stream = resp.bytes_stream();
        let mut buf = Vec::<u8>::new();

        let stream = async_stream::try_stream! {
            'read: loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("chat_stream cancelled during byte stream read");
                        None
                    }
                    chunk = byte_stream.next() => chunk,
                };

                let chunk = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        warn!(err=%e, "error reading chunk from byte stream");
                        Err::<(), _>(anyhow::Error::new(e).context("byte stream read error"))?;
                        break 'read;
                    }
                    None => break 'read,
                };

                buf.extend_from_slice(&chunk);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let Ok(line) = std::str::from_utf8(&line) else {
                        warn!("dropping non-utf8 stream line");
                        continue;
                    };
                    match parse_sse_line(line) {
                        SseLine::Delta(parts) => {
                            for delta in parts {
                                yield delta;
                            }
                        }
                        SseLine::Done => break 'read,
                        SseLine::Skip => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    fn user(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".into(),
            content: content.into(),
        }]
    }

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for d in deltas {
            let chunk = serde_json::json!({
                "id": "c1",
                "choices": [{"index": 0, "delta": {"content": d}, "finish_reason": null}]
            });
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn parse_lines() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#),
            SseLine::Delta(vec!["Hi".to_string()])
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#),
            SseLine::Delta(vec![])
        );
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
    }

    #[tokio::test]
    async fn chat_stream_yields_deltas_in_order() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::headers(contains(key("authorization"))),
                request::body(json_decoded(eq(serde_json::json!({
                    "model": "m",
                    "messages": [{"role": "user", "content": "hi"}],
                    "stream": true
                })))),
            ])
            .respond_with(
                status_code(200)
                    .insert_header("content-type", "text/event-stream")
                    .body(sse_body(&["Why did ", "the crab ", "blush?"])),
            ),
        );

        let client = OpenAIClient::new(server.url_str("/v1"), "test-key").unwrap();
        let stream = client.chat_stream("m", user("hi"), None).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec!["Why did ", "the crab ", "blush?"]);
    }

    #[tokio::test]
    async fn chat_stream_non200_is_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(401).body("invalid api key")),
        );
        let client = OpenAIClient::new(server.url_str(""), "bad").unwrap();
        let err = match client.chat_stream("m", user("hi"), None).await {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        let msg = format!("{err:#}");
        assert!(msg.contains("401"), "{msg}");
        assert_eq!(classify_error(None, &err), LlmErrorKind::Client);
    }

    #[tokio::test]
    async fn chat_stream_retries_server_errors_when_configured() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .times(2)
                .respond_with(cycle![
                    status_code(503).body("busy"),
                    status_code(200).body(sse_body(&["ok"])),
                ]),
        );
        let client = OpenAIClient::new(server.url_str(""), "k")
            .unwrap()
            .with_llm_config(crate::config::LlmConfig {
                max_retries: 1,
                retry_base_ms: 1,
                retry_jitter_ms: 0,
                ..crate::config::LlmConfig::default()
            })
            .unwrap();
        let stream = client.chat_stream("m", user("hi"), None).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec!["ok"]);
    }

    #[tokio::test]
    async fn chat_stream_cancelled_before_send() {
        let client = OpenAIClient::new("http://127.0.0.1:9", "k").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = match client.chat_stream("m", user("hi"), Some(token)).await {
            Ok(_) => panic!("expected cancellation"),
            Err(e) => e,
        };
        assert_eq!(classify_error(None, &err), LlmErrorKind::Cancelled);
    }
}
