mod composer;

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub use composer::{Assistant, tool_notice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn avatar(&self) -> &'static str {
        match self {
            Role::User => "🧑",
            Role::Assistant => "🤖",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Append-only list of turns for one session. Always opens with the assistant greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn {
                role: Role::Assistant,
                content: greeting.into(),
            }],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    /// A reply is due only while the newest turn is the user's.
    pub fn awaiting_reply(&self) -> bool {
        self.turns.last().is_some_and(|t| t.role == Role::User)
    }

    pub fn latest_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }
}

/// One streamed piece of an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    /// User-facing error text. Part of the reply, and also worth a notification.
    Failure(String),
}

impl Chunk {
    pub fn text(&self) -> &str {
        match self {
            Chunk::Text(s) | Chunk::Failure(s) => s,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Chunk::Failure(_))
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Chunk> + Send>>;

/// Concatenate a finished reply.
pub fn assemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::text).collect()
}
