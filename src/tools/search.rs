use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::info;

use crate::tools::http::join_url;
use crate::tools::{HttpFetcher, ToolAdapter, ToolError, ToolKind};

const FAILURE: &str = "complete the web search";

/// DuckDuckGo instant-answer API. Free, no key.
pub struct DuckDuckGoSearch {
    http: HttpFetcher,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    // Usually a string; calculators and converters send objects.
    answer: serde_json::Value,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RelatedTopic {
    text: Option<String>,
}

impl InstantAnswer {
    fn render(self) -> Option<String> {
        if !self.abstract_text.is_empty() {
            let mut out = format!("**{}**\n{}", self.heading, self.abstract_text);
            if !self.abstract_url.is_empty() {
                out.push_str(&format!("\n\nSource: {}", self.abstract_url));
            }
            return Some(out);
        }
        if let serde_json::Value::String(answer) = self.answer
            && !answer.is_empty()
        {
            return Some(answer);
        }
        // Category groups in RelatedTopics carry no Text of their own.
        self.related_topics
            .into_iter()
            .find_map(|t| t.text.filter(|s| !s.is_empty()))
    }
}

impl DuckDuckGoSearch {
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    async fn lookup(&self, q: &str) -> Result<String, ToolError> {
        let resp: InstantAnswer = self
            .http
            .get_json(
                &join_url(&self.base_url, ""),
                &[
                    ("q", q),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ],
            )
            .await?;
        resp.render().ok_or_else(|| {
            ToolError::NotFound(format!("I couldn't find a quick answer for '{q}'."))
        })
    }
}

#[async_trait::async_trait]
impl ToolAdapter for DuckDuckGoSearch {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    async fn call(&self, query: Option<&str>) -> String {
        let q = query.unwrap_or_default().trim();
        info!(q, provider = "duckduckgo", "web search");
        match self.lookup(q).await {
            Ok(text) => text,
            Err(e) => e.into_reply(FAILURE),
        }
    }
}

/// Serper (Google results). Needs `SERPER_API_KEY`.
pub struct SerperSearch {
    http: HttpFetcher,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SerperResponse {
    answer_box: Option<AnswerBox>,
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrganicResult {
    title: String,
    snippet: String,
    link: String,
}

impl SerperResponse {
    fn render(self) -> Option<String> {
        let boxed = self
            .answer_box
            .and_then(|b| {
                let non_empty = |s: &String| !s.is_empty();
                b.answer.filter(non_empty).or(b.snippet.filter(non_empty))
            });
        if let Some(answer) = boxed {
            return Some(format!("**Answer:** {answer}"));
        }
        self.organic
            .into_iter()
            .next()
            .map(|r| format!("**{}**\n{}\n\nSource: {}", r.title, r.snippet, r.link))
    }
}

impl SerperSearch {
    pub fn new(http: HttpFetcher, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            api_key,
        }
    }

    async fn lookup(&self, q: &str) -> Result<String, ToolError> {
        let key = self
            .api_key
            .as_deref()
            .and_then(|k| HeaderValue::from_str(k).ok())
            .ok_or(ToolError::MissingKey {
                service: "Search",
                env_var: "SERPER_API_KEY",
            })?;
        let mut headers = HeaderMap::new();
        headers.insert("X-API-KEY", key);

        let resp: SerperResponse = self
            .http
            .post_json(
                &join_url(&self.base_url, "search"),
                headers,
                &serde_json::json!({ "q": q }),
            )
            .await?;
        resp.render().ok_or_else(|| {
            ToolError::NotFound(format!("I couldn't find any web results for '{q}'."))
        })
    }
}

#[async_trait::async_trait]
impl ToolAdapter for SerperSearch {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    async fn call(&self, query: Option<&str>) -> String {
        let q = query.unwrap_or_default().trim();
        info!(q, provider = "serper", "web search");
        match self.lookup(q).await {
            Ok(text) => text,
            Err(e) => e.into_reply(FAILURE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use std::time::Duration;

    fn http() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    fn ddg_expect(server: &Server, body: serde_json::Value) {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/"),
                request::query(url_decoded(contains(("format", "json")))),
                request::query(url_decoded(contains(("no_html", "1")))),
                request::query(url_decoded(contains(("skip_disambig", "1")))),
            ])
            .respond_with(json_encoded(body)),
        );
    }

    #[tokio::test]
    async fn duckduckgo_abstract_with_source() {
        let server = Server::run();
        ddg_expect(
            &server,
            serde_json::json!({
                "Heading": "Rust (programming language)",
                "AbstractText": "Rust is a general-purpose programming language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
                "Answer": "",
                "RelatedTopics": []
            }),
        );
        let tool = DuckDuckGoSearch::new(http(), &server.url_str(""));
        assert_eq!(
            tool.call(Some("rust language")).await,
            "**Rust (programming language)**\nRust is a general-purpose programming language.\n\n\
             Source: https://en.wikipedia.org/wiki/Rust_(programming_language)"
        );
    }

    #[tokio::test]
    async fn duckduckgo_falls_back_to_related_topic() {
        let server = Server::run();
        ddg_expect(
            &server,
            serde_json::json!({
                "AbstractText": "",
                "RelatedTopics": [
                    {"Name": "Group", "Topics": []},
                    {"Text": "First related text", "FirstURL": "https://duckduckgo.com/x"}
                ]
            }),
        );
        let tool = DuckDuckGoSearch::new(http(), &server.url_str(""));
        assert_eq!(tool.call(Some("x")).await, "First related text");
    }

    #[tokio::test]
    async fn duckduckgo_ignores_structured_answer() {
        let server = Server::run();
        ddg_expect(
            &server,
            serde_json::json!({
                "Heading": "Celsius",
                "AbstractText": "The degree Celsius is a unit of temperature.",
                "Answer": {"from": "unit_conversion", "result": "212 F"},
                "RelatedTopics": []
            }),
        );
        let tool = DuckDuckGoSearch::new(http(), &server.url_str(""));
        assert_eq!(
            tool.call(Some("100 c to f")).await,
            "**Celsius**\nThe degree Celsius is a unit of temperature."
        );
    }

    #[tokio::test]
    async fn duckduckgo_plain_answer() {
        let server = Server::run();
        ddg_expect(&server, serde_json::json!({"Answer": "42", "RelatedTopics": []}));
        let tool = DuckDuckGoSearch::new(http(), &server.url_str(""));
        assert_eq!(tool.call(Some("meaning of life")).await, "42");
    }

    #[tokio::test]
    async fn duckduckgo_nothing_found() {
        let server = Server::run();
        ddg_expect(&server, serde_json::json!({}));
        let tool = DuckDuckGoSearch::new(http(), &server.url_str(""));
        assert_eq!(
            tool.call(Some("latest gpu prices")).await,
            "I couldn't find a quick answer for 'latest gpu prices'."
        );
    }

    #[tokio::test]
    async fn serper_prefers_answer_box() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/search"),
                request::headers(contains(key("x-api-key"))),
                request::body(json_decoded(eq(serde_json::json!({"q": "who won the match"})))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "answerBox": {"answer": "India"},
                "organic": [{"title": "t", "snippet": "s", "link": "l"}]
            }))),
        );
        let tool = SerperSearch::new(http(), &server.url_str(""), Some("k".into()));
        assert_eq!(
            tool.call(Some("who won the match")).await,
            "**Answer:** India"
        );
    }

    #[tokio::test]
    async fn serper_empty_answer_falls_back_to_snippet() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/search")).respond_with(
                json_encoded(serde_json::json!({
                    "answerBox": {"answer": "", "snippet": "Paris is the capital of France."},
                    "organic": [{"title": "t", "snippet": "s", "link": "l"}]
                })),
            ),
        );
        let tool = SerperSearch::new(http(), &server.url_str(""), Some("k".into()));
        assert_eq!(
            tool.call(Some("capital of france")).await,
            "**Answer:** Paris is the capital of France."
        );
    }

    #[tokio::test]
    async fn serper_uses_top_organic_result() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/search")).respond_with(
                json_encoded(serde_json::json!({
                    "organic": [
                        {"title": "Bitcoin price", "snippet": "BTC is up.", "link": "https://x.test/btc"},
                        {"title": "Other", "snippet": "", "link": ""}
                    ]
                })),
            ),
        );
        let tool = SerperSearch::new(http(), &server.url_str(""), Some("k".into()));
        assert_eq!(
            tool.call(Some("price of bitcoin")).await,
            "**Bitcoin price**\nBTC is up.\n\nSource: https://x.test/btc"
        );
    }

    #[tokio::test]
    async fn serper_without_key() {
        let tool = SerperSearch::new(http(), "http://127.0.0.1:9", None);
        assert_eq!(
            tool.call(Some("q")).await,
            "The Search API key is not configured. Please add `SERPER_API_KEY` to your secrets."
        );
    }

    #[tokio::test]
    async fn search_status_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/search"))
                .respond_with(status_code(403)),
        );
        let tool = SerperSearch::new(http(), &server.url_str(""), Some("k".into()));
        let text = tool.call(Some("q")).await;
        assert!(
            text.starts_with("Sorry, I couldn't complete the web search. Error: 403 Forbidden"),
            "{text}"
        );
    }
}
