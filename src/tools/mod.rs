//! Real-time information tools. Each adapter makes one or two HTTP calls and
//! always answers with text: failures become a readable sentence, never an `Err`.

mod cricket;
mod error;
mod http;
mod news;
mod search;
mod weather;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, SearchProvider};

pub use cricket::CricketTool;
pub use error::ToolError;
pub use http::HttpFetcher;
pub use news::NewsTool;
pub use search::{DuckDuckGoSearch, SerperSearch};
pub use weather::WeatherTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Weather,
    News,
    Cricket,
    Search,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Weather => "get_weather",
            ToolKind::News => "get_news",
            ToolKind::Cricket => "get_cricket_score",
            ToolKind::Search => "web_search",
        }
    }

    /// Whether the tool does anything useful without a query.
    pub fn needs_query(&self) -> bool {
        !matches!(self, ToolKind::Cricket)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait::async_trait]
pub trait ToolAdapter: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Run the lookup. The returned text is shown to the user verbatim.
    async fn call(&self, query: Option<&str>) -> String;
}

/// The adapters available to the composer, one per [`ToolKind`].
#[derive(Clone, Default)]
pub struct Toolbox {
    adapters: HashMap<ToolKind, Arc<dyn ToolAdapter>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let http = HttpFetcher::new(Duration::from_millis(cfg.tools.timeout_ms))
            .context("build tool http client")?;
        let t = &cfg.tools;

        let mut toolbox = Self::new()
            .with_adapter(WeatherTool::new(
                http.clone(),
                &t.geocoding_url,
                &t.forecast_url,
            ))
            .with_adapter(NewsTool::new(
                http.clone(),
                &t.news_url,
                cfg.keys.news.clone(),
            ))
            .with_adapter(CricketTool::new(
                http.clone(),
                &t.cricket_url,
                cfg.keys.cricket.clone(),
            ));

        if cfg.search.enabled {
            toolbox = match cfg.search.provider {
                SearchProvider::Duckduckgo => {
                    toolbox.with_adapter(DuckDuckGoSearch::new(http, &t.duckduckgo_url))
                }
                SearchProvider::Serper => toolbox.with_adapter(SerperSearch::new(
                    http,
                    &t.serper_url,
                    cfg.keys.serper.clone(),
                )),
            };
        }
        Ok(toolbox)
    }

    pub fn with_adapter(mut self, adapter: impl ToolAdapter + 'static) -> Self {
        self.adapters.insert(adapter.kind(), Arc::new(adapter));
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.adapters.contains_key(&kind)
    }
}
