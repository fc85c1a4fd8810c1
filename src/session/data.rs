use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::chat::Conversation;
use crate::session::error::SessionError;

/// Handed out by [`Session::begin_reply`]; the reply is only recorded if the
/// conversation was not reset in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTicket {
    generation: u64,
}

/// One browser's chat state.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub last_seen: DateTime<Utc>,
    conversation: Conversation,
    greeting: String,
    generation: u64,
    replying: bool,
}

impl Session {
    pub fn new(id: Uuid, greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            id,
            last_seen: Utc::now(),
            conversation: Conversation::new(greeting.clone()),
            greeting,
            generation: 0,
            replying: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_replying(&self) -> bool {
        self.replying
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn is_expired(&self, idle: Duration) -> bool {
        Utc::now() - self.last_seen > idle
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), SessionError> {
        if self.replying {
            return Err(SessionError::ReplyInProgress);
        }
        self.conversation.push_user(content);
        self.touch();
        Ok(())
    }

    /// Claim the right to answer the latest user turn. Returns a snapshot to answer from.
    pub fn begin_reply(&mut self) -> Result<(ReplyTicket, Conversation), SessionError> {
        if self.replying {
            return Err(SessionError::ReplyInProgress);
        }
        if !self.conversation.awaiting_reply() {
            return Err(SessionError::NothingToReply);
        }
        self.replying = true;
        self.touch();
        Ok((
            ReplyTicket {
                generation: self.generation,
            },
            self.conversation.clone(),
        ))
    }

    /// Record the assembled reply. Empty text leaves the user turn unanswered.
    /// Returns whether a turn was appended.
    pub fn finish_reply(&mut self, ticket: ReplyTicket, text: String) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.replying = false;
        self.touch();
        if text.is_empty() {
            return false;
        }
        self.conversation.push_assistant(text);
        true
    }

    /// Start over with only the greeting. An in-flight reply is discarded when it finishes.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new(self.greeting.clone());
        self.generation += 1;
        self.replying = false;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    fn session() -> Session {
        Session::new(Uuid::now_v7(), "Hello!")
    }

    #[test]
    fn reply_cycle_appends_assistant_turn() {
        let mut s = session();
        assert_eq!(s.begin_reply().unwrap_err(), SessionError::NothingToReply);

        s.push_user("hi").unwrap();
        let (ticket, snapshot) = s.begin_reply().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(s.is_replying());
        assert_eq!(s.begin_reply().unwrap_err(), SessionError::ReplyInProgress);
        assert_eq!(s.push_user("again").unwrap_err(), SessionError::ReplyInProgress);

        assert!(s.finish_reply(ticket, "hello back".into()));
        assert!(!s.is_replying());
        let last = s.conversation().turns().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "hello back");
    }

    #[test]
    fn empty_reply_leaves_turn_open() {
        let mut s = session();
        s.push_user("hi").unwrap();
        let (ticket, _) = s.begin_reply().unwrap();
        assert!(!s.finish_reply(ticket, String::new()));
        assert!(s.conversation().awaiting_reply());
        assert!(s.begin_reply().is_ok());
    }

    #[test]
    fn reset_discards_in_flight_reply() {
        let mut s = session();
        s.push_user("hi").unwrap();
        let (ticket, _) = s.begin_reply().unwrap();
        s.reset();
        assert_eq!(s.conversation().len(), 1);
        assert!(!s.is_replying());
        assert!(!s.finish_reply(ticket, "late".into()));
        assert_eq!(s.conversation().len(), 1);
    }

    #[test]
    fn expiry_uses_last_seen() {
        let mut s = session();
        s.last_seen = Utc::now() - Duration::seconds(120);
        assert!(s.is_expired(Duration::seconds(60)));
        assert!(!s.is_expired(Duration::seconds(600)));
        s.touch();
        assert!(!s.is_expired(Duration::seconds(60)));
    }
}
