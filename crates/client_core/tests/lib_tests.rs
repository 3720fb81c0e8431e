use std::sync::Arc;
use std::time::Duration;

use client_core::*;
use shared::{
    domain::{ConversationId, UserId, Visibility},
    error::{ErrorCode, TransportError},
    protocol::{AuthorProfile, ConversationSummary, CreatorProfile},
};
use transport_memory::{MemoryObjectStore, MemoryTransport};

fn ann() -> AuthorProfile {
    AuthorProfile {
        id: UserId::from("u1"),
        display_name: "Ann".to_string(),
        avatar_url: "https://avatars.example/ann.png".to_string(),
    }
}

fn conversation(visibility: Visibility) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::from("c1"),
        name: match visibility {
            Visibility::Shared => "general".to_string(),
            Visibility::Restricted => "ops".to_string(),
        },
        details: "everything else".to_string(),
        created_by: CreatorProfile {
            name: "Ann".to_string(),
            avatar_url: String::new(),
        },
        visibility,
    }
}

struct Harness {
    transport: Arc<MemoryTransport>,
    session: Arc<ConversationSession>,
}

fn harness(visibility: Visibility) -> Harness {
    let transport = MemoryTransport::new();
    let objects = MemoryObjectStore::new();
    let session = ConversationSession::new_with_dependencies(
        ann(),
        conversation(visibility),
        Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
        objects as Arc<dyn ObjectStore>,
    );
    Harness { transport, session }
}

fn partition(visibility: Visibility) -> PartitionRef {
    PartitionRef::resolve(ConversationId::from("c1"), visibility)
}

async fn wait_for(
    events: &mut tokio::sync::broadcast::Receiver<ConversationEvent>,
    mut predicate: impl FnMut(&ConversationEvent) -> bool,
) -> ConversationEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}

async fn wait_for_stream_updates(
    events: &mut tokio::sync::broadcast::Receiver<ConversationEvent>,
    count: usize,
) {
    for _ in 0..count {
        wait_for(events, |event| matches!(event, ConversationEvent::StreamUpdated)).await;
    }
}

#[tokio::test]
async fn end_to_end_single_message_view() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    let mut events = session.subscribe_events();
    session.attach().await.expect("attach");

    assert!(session.is_loading().await);
    session.send_message("hi").await.expect("send");
    wait_for_stream_updates(&mut events, 1).await;

    let visible = session.visible_messages().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].body.content(), Some("hi"));
    assert_eq!(visible[0].body.media_url(), None);
    assert_eq!(visible[0].author.display_name, "Ann");
    assert!(!session.is_loading().await);
    assert_eq!(session.participant_label().await, "1 user");

    session.set_search_term("hi").await;
    assert_eq!(session.visible_messages().await.len(), 1);
    session.set_search_term("zz").await;
    assert!(session.visible_messages().await.is_empty());

    // exactly one record, committed to the shared partition
    let records = harness.transport.records(&partition(Visibility::Shared)).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].body.content(), Some("hi"));
}

#[tokio::test]
async fn empty_and_whitespace_sends_are_rejected_locally() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    session.attach().await.expect("attach");

    assert_eq!(
        session.send_message("").await,
        Err(SessionError::EmptyMessage)
    );
    assert_eq!(
        session.send_message("   \t").await,
        Err(SessionError::EmptyMessage)
    );

    assert_eq!(
        session.errors().await,
        vec![SessionError::EmptyMessage, SessionError::EmptyMessage]
    );
    assert!(harness
        .transport
        .records(&partition(Visibility::Shared))
        .await
        .is_empty());
}

#[tokio::test]
async fn append_failure_is_recorded_and_cleared_by_the_next_success() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    session.attach().await.expect("attach");

    harness
        .transport
        .set_failure(Some(TransportError::new(
            ErrorCode::PermissionDenied,
            "writes disabled",
        )))
        .await;
    let rejected = session.send_message("hello").await;
    assert!(matches!(rejected, Err(SessionError::Append { .. })));
    assert_eq!(session.errors().await.len(), 1);
    assert!(!session.is_sending().await);
    assert!(harness
        .transport
        .records(&partition(Visibility::Shared))
        .await
        .is_empty());

    harness.transport.set_failure(None).await;
    session.send_message("hello again").await.expect("send");
    assert!(session.errors().await.is_empty());
    assert_eq!(
        harness
            .transport
            .records(&partition(Visibility::Shared))
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn toggle_starred_round_trips_the_denormalized_snapshot() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    session.attach().await.expect("attach");

    assert!(!session.is_starred().await);
    assert!(session.toggle_starred().await);
    assert!(session.is_starred().await);

    let snapshot = harness
        .transport
        .document("users/u1/starred/c1")
        .await
        .expect("snapshot stored");
    assert_eq!(snapshot["name"], "general");
    assert_eq!(snapshot["created_by"]["name"], "Ann");

    assert!(!session.toggle_starred().await);
    assert!(!session.is_starred().await);
    assert!(harness
        .transport
        .document("users/u1/starred/c1")
        .await
        .is_none());
}

#[tokio::test]
async fn toggle_starred_rolls_back_when_the_write_is_rejected() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    session.attach().await.expect("attach");

    harness
        .transport
        .set_failure(Some(TransportError::unavailable("document store offline")))
        .await;

    assert!(!session.toggle_starred().await);
    assert!(!session.is_starred().await);
    assert!(harness
        .transport
        .document("users/u1/starred/c1")
        .await
        .is_none());

    harness.transport.set_failure(None).await;
    assert!(session.toggle_starred().await);
    assert!(session.is_starred().await);
}

#[tokio::test]
async fn attach_reads_the_persisted_starred_flag() {
    let harness = harness(Visibility::Shared);
    harness
        .transport
        .upsert(
            "users/u1/starred/c1",
            serde_json::json!({"name": "general", "details": "", "created_by": {"name": "Ann", "avatar_url": ""}}),
        )
        .await
        .expect("seed starred set");

    harness.session.attach().await.expect("attach");
    assert!(harness.session.is_starred().await);
}

#[test]
fn display_label_marks_visibility() {
    assert_eq!(harness(Visibility::Shared).session.display_label(), "#general");
    assert_eq!(harness(Visibility::Restricted).session.display_label(), "@ops");
}

#[tokio::test]
async fn search_term_applies_to_live_arrivals() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    let mut events = session.subscribe_events();
    session.attach().await.expect("attach");

    session.send_message("apples").await.expect("send");
    session.send_message("bananas").await.expect("send");
    wait_for_stream_updates(&mut events, 2).await;

    session.set_search_term("BAN").await;
    let visible = session.visible_messages().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].body.content(), Some("bananas"));

    session.set_search_term("").await;
    assert_eq!(session.visible_messages().await.len(), 2);
}

#[tokio::test]
async fn upload_joins_back_into_the_observed_stream() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    let mut events = session.subscribe_events();
    session.attach().await.expect("attach");

    session
        .upload_media(
            MediaFile {
                bytes: vec![7u8; 1024],
                extension: "jpg".to_string(),
            },
            ObjectMetadata {
                content_type: Some("image/jpeg".to_string()),
            },
        )
        .await
        .expect("start upload");

    wait_for(&mut events, |event| {
        matches!(
            event,
            ConversationEvent::UploadStateChanged {
                state: UploadState::Committed,
                ..
            }
        )
    })
    .await;
    assert_eq!(session.upload_state().await, UploadState::Committed);
    assert_eq!(session.upload_percent().await, 100);

    // the join-back record reaches the listener as an ordinary arrival
    let mut visible = Vec::new();
    for _ in 0..400 {
        visible = session.visible_messages().await;
        if visible.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(visible.len(), 1);
    let media_url = visible[0].body.media_url().expect("media record");
    assert!(media_url.starts_with("memory://chat/shared/c1/"));
    assert!(media_url.ends_with(".jpg"));
    assert_eq!(visible[0].author.id, UserId::from("u1"));
    assert_eq!(session.participant_label().await, "1 user");

    session.acknowledge_upload().await;
    assert_eq!(session.upload_state().await, UploadState::Idle);
}

#[tokio::test]
async fn reattach_replaces_the_listener_without_duplicating_the_stream() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    let mut events = session.subscribe_events();
    session.attach().await.expect("first attach");

    session.send_message("before switch").await.expect("send");
    wait_for_stream_updates(&mut events, 1).await;

    // rapid navigation: a second attach tears the first subscription down
    // and replays the backlog into a fresh stream
    session.attach().await.expect("second attach");
    session.send_message("after switch").await.expect("send");

    let mut visible = Vec::new();
    for _ in 0..400 {
        visible = session.visible_messages().await;
        if visible.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let records = harness.transport.records(&partition(Visibility::Shared)).await;
    assert_eq!(visible.len(), 2, "no duplicates and no drops after reattach");
    assert_eq!(visible.len(), records.len());
}

#[tokio::test]
async fn detach_discards_the_accumulated_stream() {
    let harness = harness(Visibility::Shared);
    let session = &harness.session;
    let mut events = session.subscribe_events();
    session.attach().await.expect("attach");

    session.send_message("kept remotely").await.expect("send");
    wait_for_stream_updates(&mut events, 1).await;
    session.detach().await;

    assert!(session.visible_messages().await.is_empty());
    assert!(session.is_loading().await);
    // the record itself stays committed on the backend
    assert_eq!(
        harness
            .transport
            .records(&partition(Visibility::Shared))
            .await
            .len(),
        1
    );
}
