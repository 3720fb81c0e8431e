use shared::domain::{ConversationId, Visibility};
use uuid::Uuid;

const SHARED_ROOT: &str = "messages";
const RESTRICTED_ROOT: &str = "private_messages";
const SHARED_MEDIA_PREFIX: &str = "chat/shared";
const RESTRICTED_MEDIA_PREFIX: &str = "chat/restricted";

/// Selects which backing event partition a conversation reads and writes.
/// Shared conversations live under the `messages` root, restricted ones
/// under `private_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionRef {
    conversation_id: ConversationId,
    visibility: Visibility,
}

impl PartitionRef {
    pub fn resolve(conversation_id: ConversationId, visibility: Visibility) -> Self {
        Self {
            conversation_id,
            visibility,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn path(&self) -> String {
        let root = match self.visibility {
            Visibility::Shared => SHARED_ROOT,
            Visibility::Restricted => RESTRICTED_ROOT,
        };
        format!("{root}/{}", self.conversation_id)
    }

    /// Object-storage destination for one media file:
    /// `{visibility-scoped-prefix}/{conversation_id}/{unique_id}.{ext}`.
    /// The fresh unique id keeps concurrent uploads into the same
    /// conversation collision-free.
    pub fn media_destination(&self, extension: &str) -> String {
        let prefix = match self.visibility {
            Visibility::Shared => SHARED_MEDIA_PREFIX,
            Visibility::Restricted => RESTRICTED_MEDIA_PREFIX,
        };
        format!(
            "{prefix}/{}/{}.{extension}",
            self.conversation_id,
            Uuid::new_v4()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_and_restricted_resolve_to_distinct_roots() {
        let shared = PartitionRef::resolve(ConversationId::from("c1"), Visibility::Shared);
        let restricted = PartitionRef::resolve(ConversationId::from("c1"), Visibility::Restricted);
        assert_eq!(shared.path(), "messages/c1");
        assert_eq!(restricted.path(), "private_messages/c1");
    }

    #[test]
    fn media_destination_is_scoped_and_unique_per_call() {
        let partition = PartitionRef::resolve(ConversationId::from("c9"), Visibility::Restricted);
        let first = partition.media_destination("jpg");
        let second = partition.media_destination("jpg");
        assert!(first.starts_with("chat/restricted/c9/"));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);
    }
}
