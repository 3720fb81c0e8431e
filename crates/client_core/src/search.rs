use shared::protocol::MessageRecord;

/// Case-insensitive match against the text content or the author's display
/// name. A media-only message can match on the author name alone.
fn matches(record: &MessageRecord, needle: &str) -> bool {
    record
        .body
        .content()
        .is_some_and(|content| content.to_lowercase().contains(needle))
        || record.author.display_name.to_lowercase().contains(needle)
}

/// Order-preserving filtered view of `stream`; the input is never mutated.
/// An empty query falls back to the full accumulated stream.
pub fn filter(stream: &[MessageRecord], query: &str) -> Vec<MessageRecord> {
    if query.is_empty() {
        return stream.to_vec();
    }
    let needle = query.to_lowercase();
    stream
        .iter()
        .filter(|record| matches(record, &needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use shared::{
        domain::UserId,
        protocol::{AuthorProfile, MessageBody},
    };

    use super::*;

    fn message(author_name: &str, body: MessageBody) -> MessageRecord {
        MessageRecord {
            timestamp: 0,
            author: AuthorProfile {
                id: UserId::from("u1"),
                display_name: author_name.to_string(),
                avatar_url: String::new(),
            },
            body,
        }
    }

    fn sample_stream() -> Vec<MessageRecord> {
        vec![
            message("Ann", MessageBody::text("Hello there")),
            message("Bob", MessageBody::text("quarterly report attached")),
            message("Ann", MessageBody::media("memory://chat/shared/c1/a.jpg")),
            message("Carol", MessageBody::text("hello again")),
        ]
    }

    #[test]
    fn empty_query_returns_the_full_stream() {
        let stream = sample_stream();
        assert_eq!(filter(&stream, ""), stream);
    }

    #[test]
    fn content_match_is_case_insensitive() {
        let stream = sample_stream();
        let hits = filter(&stream, "HELLO");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body.content(), Some("Hello there"));
        assert_eq!(hits[1].body.content(), Some("hello again"));
    }

    #[test]
    fn media_only_messages_match_on_author_name() {
        let stream = sample_stream();
        let hits = filter(&stream, "ann");
        assert_eq!(hits.len(), 2);
        assert!(hits[1].body.media_url().is_some());
    }

    #[test]
    fn result_is_an_order_preserving_subsequence() {
        let stream = sample_stream();
        let hits = filter(&stream, "o");
        let mut cursor = stream.iter();
        for hit in &hits {
            assert!(
                cursor.any(|record| record == hit),
                "hit out of order relative to the stream"
            );
        }
    }

    #[test]
    fn unmatched_query_yields_an_empty_view() {
        assert!(filter(&sample_stream(), "zz").is_empty());
    }
}
