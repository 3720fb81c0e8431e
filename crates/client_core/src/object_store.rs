use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectTransferEvent {
    Progress {
        bytes_transferred: u64,
        bytes_total: u64,
    },
    Completed,
    Failed {
        reason: String,
    },
}

/// Handle for one accepted object transfer. The event channel ends with a
/// terminal `Completed` or `Failed`; a channel that closes without either is
/// treated as a failure by the consumer.
pub struct ObjectUploadJob {
    pub path: String,
    pub events: mpsc::UnboundedReceiver<ObjectTransferEvent>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<ObjectUploadJob>;

    async fn resolve_download_url(&self, path: &str) -> Result<String>;
}

pub struct MissingObjectStore;

#[async_trait]
impl ObjectStore for MissingObjectStore {
    async fn put_object(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        _metadata: ObjectMetadata,
    ) -> Result<ObjectUploadJob> {
        Err(anyhow!("object store unavailable for path {path}"))
    }

    async fn resolve_download_url(&self, path: &str) -> Result<String> {
        Err(anyhow!("object store unavailable for path {path}"))
    }
}
