use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("The {service} API key is not configured. Please add `{env_var}` to your secrets.")]
    MissingKey {
        service: &'static str,
        env_var: &'static str,
    },

    /// Carries the finished user-facing sentence.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Http(reqwest::Error),

    #[error("{status} for url ({url})")]
    Status { status: StatusCode, url: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        // URLs can carry API keys in their query string
        ToolError::Http(e.without_url())
    }
}

impl ToolError {
    /// Text shown to the user in place of a result. `what` completes "Sorry, I couldn't ...".
    pub fn into_reply(self, what: &str) -> String {
        match self {
            ToolError::MissingKey { .. } | ToolError::NotFound(_) => self.to_string(),
            other => format!("Sorry, I couldn't {what}. Error: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_configuration_error() {
        let e = ToolError::MissingKey {
            service: "Cricket",
            env_var: "CRICKET_API_KEY",
        };
        assert_eq!(
            e.into_reply("fetch the cricket scores"),
            "The Cricket API key is not configured. Please add `CRICKET_API_KEY` to your secrets."
        );
    }

    #[test]
    fn not_found_is_passed_through() {
        let e = ToolError::NotFound("No live cricket matches found at the moment.".into());
        assert_eq!(
            e.into_reply("fetch the cricket scores"),
            "No live cricket matches found at the moment."
        );
    }

    #[test]
    fn transport_errors_get_apology_prefix() {
        let e = ToolError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "http://x/v1/search".into(),
        };
        assert_eq!(
            e.into_reply("fetch the weather"),
            "Sorry, I couldn't fetch the weather. Error: 502 Bad Gateway for url (http://x/v1/search)"
        );
    }
}
