mod client_core;
mod completion;
mod prompt;
mod stream;
pub mod types;

use reqwest::StatusCode;
use thiserror::Error;

pub use client_core::*;
pub use completion::*;
#[cfg(test)]
pub(crate) use completion::testing;
pub use prompt::build_system_prompt;
pub use stream::TextStream;
pub use types::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmErrorKind {
    #[error("rate limited by the model provider")]
    RateLimited,
    #[error("model provider server error")]
    Server,
    #[error("network error")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("request rejected by the model provider")]
    Client,
    #[error("could not decode the model response")]
    Deserialize,
    #[error("the model returned an empty reply")]
    EmptyReply,
    #[error("request cancelled")]
    Cancelled,
    #[error("unknown error")]
    Unknown,
}

pub fn classify_error(status: Option<StatusCode>, err: &anyhow::Error) -> LlmErrorKind {
    if let Some(st) = status {
        if st == StatusCode::TOO_MANY_REQUESTS {
            return LlmErrorKind::RateLimited;
        }
        if st.is_server_error() {
            return LlmErrorKind::Server;
        }
        if st.is_client_error() {
            return LlmErrorKind::Client;
        }
    }
    if let Some(kind) = err.downcast_ref::<LlmErrorKind>() {
        return kind.clone();
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() {
            return LlmErrorKind::Timeout;
        }
        if e.is_decode() {
            return LlmErrorKind::Deserialize;
        }
        if e.is_connect() || e.is_body() || e.is_request() {
            return LlmErrorKind::Network;
        }
    }
    LlmErrorKind::Unknown
}
