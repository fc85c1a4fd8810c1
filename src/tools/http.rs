use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::tools::ToolError;

/// Shared outbound client for tool adapters: fixed per-request timeout, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    inner: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bytechat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { inner })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ToolError> {
        debug!(url, "tool GET");
        let resp = self.inner.get(url).query(query).send().await?;
        Self::decode(resp).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<T, ToolError> {
        debug!(url, "tool POST");
        let resp = self
            .inner
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ToolError> {
        let status = resp.status();
        if !status.is_success() {
            // Strip the query string: it may carry an API key.
            let mut url = resp.url().clone();
            url.set_query(None);
            warn!(status = status.as_u16(), url = %url, "tool request failed");
            return Err(ToolError::Status {
                status,
                url: url.to_string(),
            });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
