use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{MessageDraft, MessageRecord};
use tokio::sync::mpsc;

use crate::partition::PartitionRef;

/// Capability for one live append subscription, owned by the subscriber.
/// Releasing it stops delivery; records already queued in the channel are
/// still visible to the owner until it drops the receiver.
pub trait AppendSubscription: Send + Sync {
    fn release(self: Box<Self>);
}

pub type AppendFeed = (
    Box<dyn AppendSubscription>,
    mpsc::UnboundedReceiver<MessageRecord>,
);

/// The realtime event source backing conversation partitions, plus the keyed
/// document store used for per-user state. Implementations must deliver each
/// appended record exactly once, in append order, backlog first.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe_append(&self, partition: &PartitionRef) -> Result<AppendFeed>;

    /// Commits `draft` to the partition; the server assigns the timestamp.
    async fn append(&self, partition: &PartitionRef, draft: MessageDraft) -> Result<()>;

    /// Single point-in-time read of a keyed document or its direct children.
    async fn read_once(&self, path: &str) -> Result<Option<serde_json::Value>>;

    /// Idempotent keyed write: repeated upserts overwrite.
    async fn upsert(&self, path: &str, record: serde_json::Value) -> Result<()>;

    /// Idempotent keyed delete: removing an absent key is a no-op.
    async fn remove(&self, path: &str) -> Result<()>;
}

pub struct MissingTransport;

#[async_trait]
impl RealtimeTransport for MissingTransport {
    async fn subscribe_append(&self, partition: &PartitionRef) -> Result<AppendFeed> {
        Err(anyhow!(
            "realtime transport unavailable for partition {}",
            partition.path()
        ))
    }

    async fn append(&self, partition: &PartitionRef, _draft: MessageDraft) -> Result<()> {
        Err(anyhow!(
            "realtime transport unavailable for partition {}",
            partition.path()
        ))
    }

    async fn read_once(&self, path: &str) -> Result<Option<serde_json::Value>> {
        Err(anyhow!("realtime transport unavailable for path {path}"))
    }

    async fn upsert(&self, path: &str, _record: serde_json::Value) -> Result<()> {
        Err(anyhow!("realtime transport unavailable for path {path}"))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        Err(anyhow!("realtime transport unavailable for path {path}"))
    }
}
