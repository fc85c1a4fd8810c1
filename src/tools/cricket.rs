use serde::Deserialize;
use tracing::info;

use crate::tools::http::join_url;
use crate::tools::{HttpFetcher, ToolAdapter, ToolError, ToolKind};

/// Live cricket scores from CricAPI. Takes no query.
pub struct CricketTool {
    http: HttpFetcher,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    data: Vec<Match>,
}

#[derive(Debug, Default, Deserialize)]
struct Match {
    #[serde(default)]
    t1: Option<String>,
    #[serde(default)]
    t2: Option<String>,
    #[serde(default)]
    t1s: Option<String>,
    #[serde(default)]
    t2s: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl Match {
    fn is_running(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains("running"))
    }

    fn render(&self) -> String {
        let t1 = self.t1.as_deref().unwrap_or("Team 1");
        let t2 = self.t2.as_deref().unwrap_or("Team 2");
        let status = self.status.as_deref().unwrap_or("No status available");
        let mut block = format!("**{t1} vs {t2}**\n*{status}*\n");
        if let Some(s) = self.t1s.as_deref().filter(|s| !s.is_empty()) {
            block.push_str(&format!("- {t1}: {s}\n"));
        }
        if let Some(s) = self.t2s.as_deref().filter(|s| !s.is_empty()) {
            block.push_str(&format!("- {t2}: {s}\n"));
        }
        block
    }
}

impl CricketTool {
    pub fn new(http: HttpFetcher, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            api_key,
        }
    }

    async fn lookup(&self) -> Result<String, ToolError> {
        let key = self.api_key.as_deref().ok_or(ToolError::MissingKey {
            service: "Cricket",
            env_var: "CRICKET_API_KEY",
        })?;
        let resp: ScoreResponse = self
            .http
            .get_json(
                &join_url(&self.base_url, "v1/cricScore"),
                &[("apikey", key)],
            )
            .await?;

        if resp.data.is_empty() {
            return Err(ToolError::NotFound(
                "No live cricket matches found at the moment.".into(),
            ));
        }

        let blocks: Vec<String> = resp
            .data
            .iter()
            .filter(|m| m.is_running())
            .map(Match::render)
            .collect();
        if blocks.is_empty() {
            return Err(ToolError::NotFound(
                "There are no live cricket matches happening right now.".into(),
            ));
        }
        Ok(format!(
            "Here are the current live scores:\n\n{}",
            blocks.join("\n")
        ))
    }
}

#[async_trait::async_trait]
impl ToolAdapter for CricketTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Cricket
    }

    async fn call(&self, _query: Option<&str>) -> String {
        info!("cricket lookup");
        match self.lookup().await {
            Ok(text) => text,
            Err(e) => e.into_reply("fetch the cricket scores"),
        }
    }
}
