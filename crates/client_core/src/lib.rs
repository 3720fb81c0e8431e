use std::sync::Arc;

use shared::{
    domain::Visibility,
    protocol::{AuthorProfile, ConversationSummary, MessageBody, MessageDraft, MessageRecord},
};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

pub mod error;
pub mod listener;
pub mod object_store;
pub mod partition;
pub mod search;
pub mod starred;
pub mod transport;
pub mod upload;

pub use error::SessionError;
pub use listener::MessageStreamListener;
pub use object_store::{
    MissingObjectStore, ObjectMetadata, ObjectStore, ObjectTransferEvent, ObjectUploadJob,
};
pub use partition::PartitionRef;
pub use starred::StarredRegistry;
pub use transport::{AppendFeed, AppendSubscription, MissingTransport, RealtimeTransport};
pub use upload::{MediaFile, MediaUploadManager, UploadState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum ConversationEvent {
    StreamUpdated,
    ParticipantCountChanged(String),
    StarredChanged(bool),
    UploadStateChanged { state: UploadState, percent: u8 },
    Error(String),
}

/// One mounted conversation view: the stream listener, the starred flag, the
/// search term and the upload manager, coordinated only by sharing the
/// conversation id. The presentation layer reads snapshots and subscribes to
/// [`ConversationEvent`]s.
pub struct ConversationSession {
    transport: Arc<dyn RealtimeTransport>,
    user: AuthorProfile,
    conversation: ConversationSummary,
    partition: PartitionRef,
    starred_registry: StarredRegistry,
    upload: Arc<MediaUploadManager>,
    inner: Mutex<SessionState>,
    // shared with the upload manager so every recovered failure lands in
    // one inspectable list
    errors: Arc<Mutex<Vec<SessionError>>>,
    events: broadcast::Sender<ConversationEvent>,
}

struct SessionState {
    listener: Option<Arc<MessageStreamListener>>,
    starred: bool,
    search_term: String,
    sending: bool,
}

impl ConversationSession {
    pub fn new(user: AuthorProfile, conversation: ConversationSummary) -> Arc<Self> {
        Self::new_with_dependencies(
            user,
            conversation,
            Arc::new(MissingTransport),
            Arc::new(MissingObjectStore),
        )
    }

    pub fn new_with_dependencies(
        user: AuthorProfile,
        conversation: ConversationSummary,
        transport: Arc<dyn RealtimeTransport>,
        objects: Arc<dyn ObjectStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let partition = PartitionRef::resolve(conversation.id.clone(), conversation.visibility);
        let starred_registry = StarredRegistry::new(Arc::clone(&transport), user.id.clone());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let upload = MediaUploadManager::new(
            Arc::clone(&transport),
            objects,
            partition.clone(),
            user.clone(),
            Arc::clone(&errors),
            events.clone(),
        );
        Arc::new(Self {
            transport,
            user,
            conversation,
            partition,
            starred_registry,
            upload,
            inner: Mutex::new(SessionState {
                listener: None,
                starred: false,
                search_term: String::new(),
                sending: false,
            }),
            errors,
            events,
        })
    }

    /// Mount: spawn the stream listener and run the one-shot starred read.
    /// Re-attaching tears the previous subscription down first so stale
    /// arrivals can never land in the new stream.
    pub async fn attach(self: &Arc<Self>) -> anyhow::Result<()> {
        let listener = MessageStreamListener::spawn(
            Arc::clone(&self.transport),
            self.partition.clone(),
            self.events.clone(),
        )
        .await?;
        let previous = self.inner.lock().await.listener.replace(listener);
        if let Some(previous) = previous {
            previous.detach().await;
        }

        match self.starred_registry.is_starred(&self.conversation.id).await {
            Ok(starred) => {
                self.inner.lock().await.starred = starred;
                let _ = self.events.send(ConversationEvent::StarredChanged(starred));
            }
            Err(err) => warn!(
                "starred: initial read failed conversation={} err={err:#}",
                self.conversation.id
            ),
        }
        Ok(())
    }

    /// Unmount: release the stream subscription. The accumulated stream is
    /// discarded with the listener.
    pub async fn detach(&self) {
        let listener = self.inner.lock().await.listener.take();
        if let Some(listener) = listener {
            listener.detach().await;
        }
    }

    /// Appends a text message. Empty or whitespace-only input is a
    /// validation error surfaced locally and never sent. A successful append
    /// clears the accumulated error list.
    pub async fn send_message(&self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            let error = SessionError::EmptyMessage;
            self.errors.lock().await.push(error.clone());
            let _ = self
                .events
                .send(ConversationEvent::Error(error.to_string()));
            return Err(error);
        }

        self.inner.lock().await.sending = true;
        let draft = MessageDraft {
            author: self.user.clone(),
            body: MessageBody::text(text),
        };
        let result = self.transport.append(&self.partition, draft).await;

        self.inner.lock().await.sending = false;
        match result {
            Ok(()) => {
                self.errors.lock().await.clear();
                Ok(())
            }
            Err(err) => {
                let error = SessionError::append(&err);
                self.errors.lock().await.push(error.clone());
                let _ = self
                    .events
                    .send(ConversationEvent::Error(error.to_string()));
                Err(error)
            }
        }
    }

    /// Optimistic toggle with rollback: the local flag flips immediately,
    /// the remote write follows, and a rejected write restores the
    /// pre-toggle flag. Returns the flag as settled.
    pub async fn toggle_starred(&self) -> bool {
        let starred = {
            let mut guard = self.inner.lock().await;
            guard.starred = !guard.starred;
            guard.starred
        };
        let _ = self.events.send(ConversationEvent::StarredChanged(starred));

        let result = if starred {
            self.starred_registry.star(&self.conversation).await
        } else {
            self.starred_registry.unstar(&self.conversation.id).await
        };

        if let Err(err) = result {
            let restored = {
                let mut guard = self.inner.lock().await;
                guard.starred = !starred;
                guard.starred
            };
            warn!(
                "starred: reconciliation failed conversation={} rolled_back_to={restored} err={err:#}",
                self.conversation.id
            );
            let _ = self
                .events
                .send(ConversationEvent::StarredChanged(restored));
            return restored;
        }
        starred
    }

    pub async fn set_search_term(&self, term: impl Into<String>) {
        self.inner.lock().await.search_term = term.into();
        let _ = self.events.send(ConversationEvent::StreamUpdated);
    }

    /// The filtered subsequence while a search term is active, the full
    /// accumulated stream otherwise.
    pub async fn visible_messages(&self) -> Vec<MessageRecord> {
        let (listener, term) = {
            let guard = self.inner.lock().await;
            (guard.listener.clone(), guard.search_term.clone())
        };
        let Some(listener) = listener else {
            return Vec::new();
        };
        let stream = listener.messages().await;
        search::filter(&stream, &term)
    }

    pub async fn upload_media(
        &self,
        file: MediaFile,
        metadata: ObjectMetadata,
    ) -> Result<(), SessionError> {
        self.upload.start(file, metadata).await
    }

    pub async fn upload_state(&self) -> UploadState {
        self.upload.state().await
    }

    pub async fn upload_percent(&self) -> u8 {
        self.upload.percent_complete().await
    }

    pub async fn acknowledge_upload(&self) {
        self.upload.acknowledge().await
    }

    pub async fn is_loading(&self) -> bool {
        let listener = self.inner.lock().await.listener.clone();
        match listener {
            Some(listener) => listener.is_loading().await,
            None => true,
        }
    }

    pub async fn participant_label(&self) -> String {
        let listener = self.inner.lock().await.listener.clone();
        match listener {
            Some(listener) => listener.participant_label().await,
            None => listener::unique_author_label(&[]),
        }
    }

    pub async fn is_starred(&self) -> bool {
        self.inner.lock().await.starred
    }

    pub async fn is_sending(&self) -> bool {
        self.inner.lock().await.sending
    }

    pub async fn errors(&self) -> Vec<SessionError> {
        self.errors.lock().await.clone()
    }

    /// Header label: `#name` for shared conversations, `@name` for
    /// restricted ones.
    pub fn display_label(&self) -> String {
        match self.conversation.visibility {
            Visibility::Shared => format!("#{}", self.conversation.name),
            Visibility::Restricted => format!("@{}", self.conversation.name),
        }
    }

    pub fn conversation(&self) -> &ConversationSummary {
        &self.conversation
    }

    pub fn user(&self) -> &AuthorProfile {
        &self.user
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }
}
