//! Core data types used throughout docchat.
//!
//! These types represent the documents, chunks, and conversation turns that
//! flow through the ingestion and chat pipelines.

use serde::{Deserialize, Serialize};

/// Text extracted from one uploaded file, tagged with its source filename.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    /// Source filename (basename of the uploaded file).
    pub source: String,
}

/// A bounded-size slice of a document's text.
///
/// The first `overlap` characters of `content` repeat the tail of the
/// previous chunk so that context survives chunk boundaries. Stripping
/// that prefix from every chunk and concatenating the rest reconstructs
/// the document text exactly.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    /// Number of characters shared with the predecessor chunk (0 for the first).
    pub overlap: usize,
    /// Inherited from the parent document.
    pub source: String,
}

impl Chunk {
    /// The part of this chunk not already covered by its predecessor.
    pub fn new_content(&self) -> String {
        self.content.chars().skip(self.overlap).collect()
    }
}

/// A vector store entry: one embedded chunk. Append-only; entries are
/// never updated once written.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Opaque entry id (UUIDv4).
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub source: String,
}

/// A chunk returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub source: String,
    pub score: f32,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a session's ordered conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ConversationTurn::user("hi")).unwrap();
        assert!(json.contains("\"user\""));
        let json = serde_json::to_string(&ConversationTurn::assistant("hello")).unwrap();
        assert!(json.contains("\"assistant\""));
    }

    #[test]
    fn new_content_skips_overlap_prefix() {
        let chunk = Chunk {
            content: "abcdef".to_string(),
            overlap: 3,
            source: "a.txt".to_string(),
        };
        assert_eq!(chunk.new_content(), "def");
    }
}
