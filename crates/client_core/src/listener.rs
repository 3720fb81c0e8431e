use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use futures::StreamExt;
use shared::protocol::MessageRecord;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::{
    partition::PartitionRef,
    transport::{AppendSubscription, RealtimeTransport},
    ConversationEvent,
};

/// Accumulates one conversation's append events in arrival order and keeps
/// the distinct-author aggregate current. The accumulated stream is owned
/// exclusively by this listener and discarded with it.
pub struct MessageStreamListener {
    partition: PartitionRef,
    inner: Mutex<ListenerState>,
    events: broadcast::Sender<ConversationEvent>,
    subscription: Mutex<Option<Box<dyn AppendSubscription>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    detached: AtomicBool,
}

struct ListenerState {
    messages: Vec<MessageRecord>,
    loading: bool,
    participant_label: String,
}

impl MessageStreamListener {
    pub async fn spawn(
        transport: Arc<dyn RealtimeTransport>,
        partition: PartitionRef,
        events: broadcast::Sender<ConversationEvent>,
    ) -> Result<Arc<Self>> {
        let (subscription, receiver) = transport.subscribe_append(&partition).await?;
        let listener = Arc::new(Self {
            partition,
            inner: Mutex::new(ListenerState {
                messages: Vec::new(),
                loading: true,
                participant_label: unique_author_label(&[]),
            }),
            events,
            subscription: Mutex::new(Some(subscription)),
            task: Mutex::new(None),
            detached: AtomicBool::new(false),
        });

        let task = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move {
                let mut arrivals = UnboundedReceiverStream::new(receiver);
                while let Some(record) = arrivals.next().await {
                    if listener.detached.load(Ordering::SeqCst) {
                        break;
                    }
                    listener.ingest(record).await;
                }
            })
        };
        *listener.task.lock().await = Some(task);
        Ok(listener)
    }

    /// Appends in arrival order and recomputes the aggregate before the next
    /// arrival is accepted.
    async fn ingest(&self, record: MessageRecord) {
        let label = {
            let mut guard = self.inner.lock().await;
            guard.messages.push(record);
            guard.loading = false;
            guard.participant_label = unique_author_label(&guard.messages);
            guard.participant_label.clone()
        };
        let _ = self.events.send(ConversationEvent::StreamUpdated);
        let _ = self
            .events
            .send(ConversationEvent::ParticipantCountChanged(label));
    }

    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.inner.lock().await.messages.clone()
    }

    /// True until the first append event has been delivered.
    pub async fn is_loading(&self) -> bool {
        self.inner.lock().await.loading
    }

    pub async fn participant_label(&self) -> String {
        self.inner.lock().await.participant_label.clone()
    }

    /// Releases the subscription and stops ingestion. Arrivals still queued
    /// at teardown are discarded, never appended.
    pub async fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.release();
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        info!("listener: detached partition={}", self.partition.path());
    }
}

/// Distinct-author count over the whole stream, formatted the way the
/// conversation header renders it. Authors are distinguished by display
/// name; duplicate arrivals never inflate the count.
pub fn unique_author_label(messages: &[MessageRecord]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for message in messages {
        if !names.contains(&message.author.display_name.as_str()) {
            names.push(message.author.display_name.as_str());
        }
    }
    match names.len() {
        1 => "1 user".to_string(),
        count => format!("{count} users"),
    }
}

#[cfg(test)]
#[path = "tests/listener_tests.rs"]
mod tests;
