use serde::Deserialize;
use tracing::info;

use crate::tools::http::join_url;
use crate::tools::{HttpFetcher, ToolAdapter, ToolError, ToolKind};

const HEADLINE_LIMIT: usize = 3;

/// Top headlines for a topic from TheNewsAPI.
pub struct NewsTool {
    http: HttpFetcher,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    data: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
}

impl NewsTool {
    pub fn new(http: HttpFetcher, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            api_key,
        }
    }

    async fn lookup(&self, topic: &str) -> Result<String, ToolError> {
        let key = self.api_key.as_deref().ok_or(ToolError::MissingKey {
            service: "News",
            env_var: "NEWS_API_KEY",
        })?;
        let limit = HEADLINE_LIMIT.to_string();
        let resp: NewsResponse = self
            .http
            .get_json(
                &join_url(&self.base_url, "v1/news/top"),
                &[("api_token", key), ("search", topic), ("limit", limit.as_str())],
            )
            .await?;

        if resp.data.is_empty() {
            return Err(ToolError::NotFound(format!(
                "I couldn't find any recent news about '{topic}'."
            )));
        }

        let mut out = format!("Here are the top headlines about '{topic}':");
        for article in resp.data.iter().take(HEADLINE_LIMIT) {
            out.push_str("\n- ");
            out.push_str(&article.title);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ToolAdapter for NewsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::News
    }

    async fn call(&self, query: Option<&str>) -> String {
        let topic = query.unwrap_or_default().trim();
        info!(topic, "news lookup");
        match self.lookup(topic).await {
            Ok(text) => text,
            Err(e) => e.into_reply("fetch the news"),
        }
    }
}
