use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use client_core::{
    ConversationEvent, ConversationSession, MediaFile, ObjectMetadata, ObjectStore,
    RealtimeTransport, UploadState,
};
use shared::{
    domain::{ConversationId, UserId, Visibility},
    protocol::{AuthorProfile, ConversationSummary, CreatorProfile},
};
use transport_memory::{MemoryObjectStore, MemoryTransport};

#[derive(Parser, Debug)]
struct Args {
    /// Display name used for outgoing messages
    #[arg(long, default_value = "Ann")]
    name: String,
    /// Conversation to mount
    #[arg(long, default_value = "general")]
    conversation: String,
    /// Mount the restricted partition instead of the shared one
    #[arg(long)]
    restricted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let transport = MemoryTransport::new();
    let objects = MemoryObjectStore::new();

    let visibility = if args.restricted {
        Visibility::Restricted
    } else {
        Visibility::Shared
    };
    let conversation = ConversationSummary {
        id: ConversationId::new(args.conversation.clone()),
        name: args.conversation.clone(),
        details: "demo conversation".to_string(),
        created_by: CreatorProfile {
            name: args.name.clone(),
            avatar_url: String::new(),
        },
        visibility,
    };
    let user = AuthorProfile {
        id: UserId::new(args.name.to_lowercase()),
        display_name: args.name.clone(),
        avatar_url: String::new(),
    };

    let session = ConversationSession::new_with_dependencies(
        user,
        conversation.clone(),
        Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
    );

    let mut events = session.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ConversationEvent::StreamUpdated => {}
                ConversationEvent::ParticipantCountChanged(label) => {
                    println!("participants: {label}");
                }
                ConversationEvent::StarredChanged(starred) => println!("starred: {starred}"),
                ConversationEvent::UploadStateChanged { state, percent } => {
                    println!("upload: {state:?} {percent}%");
                }
                ConversationEvent::Error(message) => println!("error: {message}"),
            }
        }
    });

    session.attach().await?;
    println!("Mounted {}", session.display_label());

    session.send_message("hello from the demo").await?;

    // a second participant posting into the same partition
    let peer = ConversationSession::new_with_dependencies(
        AuthorProfile {
            id: UserId::from("bob"),
            display_name: "Bob".to_string(),
            avatar_url: String::new(),
        },
        conversation,
        Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
    );
    peer.send_message("hi back").await?;

    session.toggle_starred().await;

    session
        .upload_media(
            MediaFile {
                bytes: vec![0u8; 4096],
                extension: "jpg".to_string(),
            },
            ObjectMetadata {
                content_type: Some("image/jpeg".to_string()),
            },
        )
        .await?;

    // wait for the upload to commit and its join-back message to arrive
    for _ in 0..100 {
        if session.upload_state().await == UploadState::Committed
            && session.visible_messages().await.len() == 3
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("-- transcript --");
    for message in session.visible_messages().await {
        let body = match message.body.content() {
            Some(content) => content.to_string(),
            None => format!("[media] {}", message.body.media_url().unwrap_or_default()),
        };
        println!("{} {}: {body}", message.timestamp, message.author.display_name);
    }
    println!("participants: {}", session.participant_label().await);

    session.set_search_term("hello").await;
    println!(
        "matches for \"hello\": {}",
        session.visible_messages().await.len()
    );

    session.detach().await;
    printer.abort();
    Ok(())
}
