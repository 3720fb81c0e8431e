use std::sync::Arc;

use futures::StreamExt;
use shared::protocol::{AuthorProfile, MessageBody, MessageDraft};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::{
    error::SessionError,
    object_store::{ObjectMetadata, ObjectStore, ObjectTransferEvent, ObjectUploadJob},
    partition::PartitionRef,
    transport::RealtimeTransport,
    ConversationEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Queued,
    Transferring,
    Finalizing,
    Committed,
    Failed,
}

impl UploadState {
    /// Queued, Transferring and Finalizing block a fresh `start`.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            UploadState::Queued | UploadState::Transferring | UploadState::Finalizing
        )
    }
}

/// Bytes to upload plus the extension used for the destination object name.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Drives a single in-flight upload through
/// `Queued -> Transferring -> Finalizing -> Committed | Failed` and joins a
/// successful transfer back into the conversation stream through the same
/// append path as text messages.
pub struct MediaUploadManager {
    transport: Arc<dyn RealtimeTransport>,
    objects: Arc<dyn ObjectStore>,
    partition: PartitionRef,
    author: AuthorProfile,
    inner: Mutex<UploadInner>,
    errors: Arc<Mutex<Vec<SessionError>>>,
    events: broadcast::Sender<ConversationEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct UploadInner {
    state: UploadState,
    percent: u8,
    error: Option<String>,
}

impl MediaUploadManager {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        objects: Arc<dyn ObjectStore>,
        partition: PartitionRef,
        author: AuthorProfile,
        errors: Arc<Mutex<Vec<SessionError>>>,
        events: broadcast::Sender<ConversationEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            objects,
            partition,
            author,
            inner: Mutex::new(UploadInner {
                state: UploadState::Idle,
                percent: 0,
                error: None,
            }),
            errors,
            events,
            task: Mutex::new(None),
        })
    }

    pub async fn state(&self) -> UploadState {
        self.inner.lock().await.state
    }

    pub async fn percent_complete(&self) -> u8 {
        self.inner.lock().await.percent
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    /// Starts a fresh job unless one is already live. Transfer failures are
    /// reported through the state machine and the event channel, not as a
    /// return value.
    pub async fn start(
        self: &Arc<Self>,
        file: MediaFile,
        metadata: ObjectMetadata,
    ) -> Result<(), SessionError> {
        {
            let mut guard = self.inner.lock().await;
            if guard.state.is_live() {
                return Err(SessionError::UploadBusy);
            }
            guard.state = UploadState::Queued;
            guard.percent = 0;
            guard.error = None;
        }
        self.broadcast_state().await;

        let destination = self.partition.media_destination(&file.extension);
        let job = match self.objects.put_object(&destination, file.bytes, metadata).await {
            Ok(job) => job,
            Err(err) => {
                self.fail(format!("transfer rejected: {err:#}")).await;
                return Ok(());
            }
        };
        self.transition(UploadState::Transferring).await;

        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            manager.drive(job).await;
        });
        *self.task.lock().await = Some(task);
        Ok(())
    }

    /// Failed -> Idle and Committed -> Idle; live states are unaffected.
    pub async fn acknowledge(&self) {
        let changed = {
            let mut guard = self.inner.lock().await;
            if matches!(guard.state, UploadState::Failed | UploadState::Committed) {
                guard.state = UploadState::Idle;
                guard.percent = 0;
                guard.error = None;
                true
            } else {
                false
            }
        };
        if changed {
            self.broadcast_state().await;
        }
    }

    async fn drive(self: Arc<Self>, job: ObjectUploadJob) {
        let destination = job.path;
        let mut transfer_events = UnboundedReceiverStream::new(job.events);
        while let Some(event) = transfer_events.next().await {
            match event {
                ObjectTransferEvent::Progress {
                    bytes_transferred,
                    bytes_total,
                } => {
                    self.observe_progress(bytes_transferred, bytes_total).await;
                }
                ObjectTransferEvent::Failed { reason } => {
                    self.fail(reason).await;
                    return;
                }
                ObjectTransferEvent::Completed => {
                    self.finalize(&destination).await;
                    return;
                }
            }
        }
        self.fail("transfer channel closed before completion".to_string())
            .await;
    }

    async fn observe_progress(&self, bytes_transferred: u64, bytes_total: u64) {
        if bytes_total == 0 {
            return;
        }
        let rounded = ((bytes_transferred as f64 / bytes_total as f64) * 100.0).round() as u8;
        let (state, percent) = {
            let mut guard = self.inner.lock().await;
            // clamp: observed percent never decreases even if the store
            // re-reports an earlier offset
            guard.percent = guard.percent.max(rounded.min(100));
            (guard.state, guard.percent)
        };
        let _ = self
            .events
            .send(ConversationEvent::UploadStateChanged { state, percent });
    }

    /// The append happens-after transfer completion and happens-before the
    /// Committed transition; the listener observes the result as an ordinary
    /// arrival.
    async fn finalize(&self, destination: &str) {
        self.transition(UploadState::Finalizing).await;

        let media_url = match self.objects.resolve_download_url(destination).await {
            Ok(url) => url,
            Err(err) => {
                self.fail(format!("download url resolution failed: {err:#}"))
                    .await;
                return;
            }
        };

        let draft = MessageDraft {
            author: self.author.clone(),
            body: MessageBody::media(media_url),
        };
        match self.transport.append(&self.partition, draft).await {
            Ok(()) => {
                info!("upload: committed destination={destination}");
                self.transition(UploadState::Committed).await;
            }
            Err(err) => {
                // The stored object is now orphaned; no message references it.
                warn!("upload: join-back append failed destination={destination} err={err:#}");
                self.fail(format!("append failed: {err:#}")).await;
            }
        }
    }

    async fn fail(&self, reason: String) {
        {
            let mut guard = self.inner.lock().await;
            guard.state = UploadState::Failed;
            guard.error = Some(reason.clone());
        }
        self.errors.lock().await.push(SessionError::Upload {
            reason: reason.clone(),
        });
        let _ = self.events.send(ConversationEvent::Error(reason));
        self.broadcast_state().await;
    }

    async fn transition(&self, state: UploadState) {
        self.inner.lock().await.state = state;
        self.broadcast_state().await;
    }

    async fn broadcast_state(&self) {
        let (state, percent) = {
            let guard = self.inner.lock().await;
            (guard.state, guard.percent)
        };
        let _ = self
            .events
            .send(ConversationEvent::UploadStateChanged { state, percent });
    }
}
