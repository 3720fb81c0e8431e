use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, UserId, Visibility};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: String,
}

/// A message carries exactly one of a text body or a media reference; the
/// untagged representation keeps the wire shape as a single `content` or
/// `media_url` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text { content: String },
    Media { media_url: String },
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn media(media_url: impl Into<String>) -> Self {
        Self::Media {
            media_url: media_url.into(),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            Self::Media { .. } => None,
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Media { media_url } => Some(media_url),
        }
    }
}

/// One committed record in a conversation partition. `timestamp` is assigned
/// by the backend at commit and is the identity key within the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: i64,
    pub author: AuthorProfile,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// What a client hands to the transport for appending; the server supplies
/// the timestamp when the record is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub author: AuthorProfile,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorProfile {
    pub name: String,
    pub avatar_url: String,
}

/// Read-only conversation context owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: String,
    pub details: String,
    pub created_by: CreatorProfile,
    pub visibility: Visibility,
}

/// Denormalized record stored under a user's starred set, keyed by
/// conversation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarredSnapshot {
    pub name: String,
    pub details: String,
    pub created_by: CreatorProfile,
}

impl StarredSnapshot {
    pub fn of(conversation: &ConversationSummary) -> Self {
        Self {
            name: conversation.name.clone(),
            details: conversation.details.clone(),
            created_by: conversation.created_by.clone(),
        }
    }
}
