use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::{ConversationId, UserId},
    protocol::{ConversationSummary, StarredSnapshot},
};

use crate::transport::RealtimeTransport;

/// Reconciles a user's starred set against the remotely stored mapping.
/// Keyed layout: `users/{user_id}/starred/{conversation_id}` holds a
/// denormalized [`StarredSnapshot`].
pub struct StarredRegistry {
    transport: Arc<dyn RealtimeTransport>,
    user_id: UserId,
}

impl StarredRegistry {
    pub fn new(transport: Arc<dyn RealtimeTransport>, user_id: UserId) -> Self {
        Self { transport, user_id }
    }

    fn set_path(&self) -> String {
        format!("users/{}/starred", self.user_id)
    }

    fn entry_path(&self, conversation_id: &ConversationId) -> String {
        format!("{}/{conversation_id}", self.set_path())
    }

    /// One-shot read at mount. An absent starred set reads as not starred.
    pub async fn is_starred(&self, conversation_id: &ConversationId) -> Result<bool> {
        let Some(value) = self.transport.read_once(&self.set_path()).await? else {
            return Ok(false);
        };
        Ok(value
            .as_object()
            .is_some_and(|set| set.contains_key(conversation_id.as_str())))
    }

    /// Upserts the denormalized snapshot; repeated calls overwrite the same
    /// key, never duplicate it.
    pub async fn star(&self, conversation: &ConversationSummary) -> Result<()> {
        let snapshot = serde_json::to_value(StarredSnapshot::of(conversation))?;
        self.transport
            .upsert(&self.entry_path(&conversation.id), snapshot)
            .await
    }

    /// Removes the keyed record; removing an absent key is a no-op.
    pub async fn unstar(&self, conversation_id: &ConversationId) -> Result<()> {
        self.transport
            .remove(&self.entry_path(conversation_id))
            .await
    }
}
