use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("the latest turn is not a user turn")]
    NothingToReply,

    #[error("a reply is already being generated for this session")]
    ReplyInProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(
            SessionError::NothingToReply.to_string(),
            "the latest turn is not a user turn"
        );
        assert_eq!(
            SessionError::ReplyInProgress.to_string(),
            "a reply is already being generated for this session"
        );
    }
}
