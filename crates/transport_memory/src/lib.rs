//! In-process reference implementation of the realtime transport and the
//! object store, with the delivery semantics the engine relies on: per
//! partition, exactly-once delivery in append order, stored backlog first,
//! then live arrivals.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use client_core::{
    object_store::{ObjectMetadata, ObjectStore, ObjectTransferEvent, ObjectUploadJob},
    partition::PartitionRef,
    transport::{AppendFeed, AppendSubscription, RealtimeTransport},
};
use shared::{
    error::TransportError,
    protocol::{MessageDraft, MessageRecord},
};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

pub struct MemoryTransport {
    inner: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    partitions: HashMap<String, Vec<MessageRecord>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    documents: HashMap<String, serde_json::Value>,
    last_timestamp: i64,
    failure: Option<TransportError>,
}

struct Subscriber {
    active: Arc<AtomicBool>,
    sender: mpsc::UnboundedSender<MessageRecord>,
}

struct MemorySubscription {
    active: Arc<AtomicBool>,
}

impl AppendSubscription for MemorySubscription {
    fn release(self: Box<Self>) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TransportState::default()),
        })
    }

    /// Makes every subsequent mutating call (`append`, `upsert`, `remove`)
    /// fail with the given rejection until cleared with `None`.
    pub async fn set_failure(&self, failure: Option<TransportError>) {
        self.inner.lock().await.failure = failure;
    }

    /// Committed records of one partition, in storage order.
    pub async fn records(&self, partition: &PartitionRef) -> Vec<MessageRecord> {
        self.inner
            .lock()
            .await
            .partitions
            .get(&partition.path())
            .cloned()
            .unwrap_or_default()
    }

    pub async fn document(&self, path: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.documents.get(path).cloned()
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn subscribe_append(&self, partition: &PartitionRef) -> Result<AppendFeed> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let mut state = self.inner.lock().await;
        // backlog replay and subscriber registration happen under the same
        // lock as append, so a concurrent append can neither be lost nor
        // delivered twice
        if let Some(backlog) = state.partitions.get(&partition.path()) {
            for record in backlog {
                let _ = sender.send(record.clone());
            }
        }
        state
            .subscribers
            .entry(partition.path())
            .or_default()
            .push(Subscriber {
                active: Arc::clone(&active),
                sender,
            });
        Ok((Box::new(MemorySubscription { active }), receiver))
    }

    async fn append(&self, partition: &PartitionRef, draft: MessageDraft) -> Result<()> {
        let mut state = self.inner.lock().await;
        if let Some(failure) = &state.failure {
            return Err(failure.clone().into());
        }
        // server clock: wall millis, bumped so no two records in the store
        // ever share a timestamp
        let timestamp = Utc::now()
            .timestamp_millis()
            .max(state.last_timestamp + 1);
        state.last_timestamp = timestamp;

        let record = MessageRecord {
            timestamp,
            author: draft.author,
            body: draft.body,
        };
        let path = partition.path();
        state
            .partitions
            .entry(path.clone())
            .or_default()
            .push(record.clone());
        if let Some(subscribers) = state.subscribers.get_mut(&path) {
            subscribers.retain(|subscriber| {
                subscriber.active.load(Ordering::SeqCst)
                    && subscriber.sender.send(record.clone()).is_ok()
            });
        }
        debug!("memory: appended partition={path} timestamp={timestamp}");
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let state = self.inner.lock().await;
        if let Some(value) = state.documents.get(path) {
            return Ok(Some(value.clone()));
        }
        // the document namespace is flat; a read of a grouping path
        // assembles its direct children into one object
        let prefix = format!("{path}/");
        let mut children = serde_json::Map::new();
        for (key, value) in &state.documents {
            if let Some(child) = key.strip_prefix(&prefix) {
                if !child.is_empty() && !child.contains('/') {
                    children.insert(child.to_string(), value.clone());
                }
            }
        }
        if children.is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::Value::Object(children)))
        }
    }

    async fn upsert(&self, path: &str, record: serde_json::Value) -> Result<()> {
        let mut state = self.inner.lock().await;
        if let Some(failure) = &state.failure {
            return Err(failure.clone().into());
        }
        state.documents.insert(path.to_string(), record);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        if let Some(failure) = &state.failure {
            return Err(failure.clone().into());
        }
        state.documents.remove(path);
        Ok(())
    }
}

const TRANSFER_CHUNKS: u64 = 4;

pub struct MemoryObjectStore {
    inner: Mutex<ObjectStoreState>,
}

#[derive(Default)]
struct ObjectStoreState {
    objects: HashMap<String, StoredObject>,
    failure: Option<String>,
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ObjectStoreState::default()),
        })
    }

    /// Makes every subsequent transfer end with a terminal `Failed` event.
    pub async fn set_failure(&self, failure: Option<String>) {
        self.inner.lock().await.failure = failure;
    }

    pub async fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .await
            .objects
            .get(path)
            .map(|object| object.bytes.clone())
    }

    pub async fn content_type(&self, path: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .objects
            .get(path)
            .and_then(|object| object.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<ObjectUploadJob> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bytes_total = bytes.len() as u64;
        let failure = {
            let mut state = self.inner.lock().await;
            if state.failure.is_none() {
                state.objects.insert(
                    path.to_string(),
                    StoredObject {
                        bytes,
                        content_type: metadata.content_type,
                    },
                );
            }
            state.failure.clone()
        };

        tokio::spawn(async move {
            if let Some(reason) = failure {
                let _ = sender.send(ObjectTransferEvent::Progress {
                    bytes_transferred: 0,
                    bytes_total,
                });
                let _ = sender.send(ObjectTransferEvent::Failed { reason });
                return;
            }
            for chunk in 1..=TRANSFER_CHUNKS {
                let _ = sender.send(ObjectTransferEvent::Progress {
                    bytes_transferred: bytes_total * chunk / TRANSFER_CHUNKS,
                    bytes_total,
                });
                tokio::task::yield_now().await;
            }
            let _ = sender.send(ObjectTransferEvent::Completed);
        });

        Ok(ObjectUploadJob {
            path: path.to_string(),
            events: receiver,
        })
    }

    async fn resolve_download_url(&self, path: &str) -> Result<String> {
        let state = self.inner.lock().await;
        if state.objects.contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(anyhow::anyhow!("no stored object at {path}"))
        }
    }
}
