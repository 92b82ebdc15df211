//! Wire types for the real-time relay (must match server protocol).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::content::ContentId;
use crate::room_code::RoomCode;

/// A relay destination. The relay never interprets payloads; it fans frames
/// out to every subscriber of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Play events for a watch-party room.
    pub fn watch_party(code: &RoomCode) -> Self {
        Topic(format!("watch-party/{code}"))
    }

    /// Chat messages scoped to a video.
    pub fn chat(content: &ContentId) -> Self {
        Topic(format!("video/{content}/chat"))
    }

    /// Join notifications scoped to a video.
    pub fn join(content: &ContentId) -> Self {
        Topic(format!("video/{content}/join"))
    }

    /// Leave notifications scoped to a video.
    pub fn leave(content: &ContentId) -> Self {
        Topic(format!("video/{content}/leave"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frames exchanged with the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Frame {
    // Client -> Server
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
    Publish { topic: Topic, body: Value },

    // Server -> Client
    Subscribed { topic: Topic },
    Event { topic: Topic, body: Value },
    Error { message: String },
}

/// Instructs every member of a room to start watching a video. Transient;
/// delivered at most once per subscriber, including the publisher's own
/// subscriptions (there is no sender-echo suppression).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub content_id: ContentId,
    pub title: String,
    pub host_name: String,
}

/// A chat line scoped to a video. Join/leave notifications reuse this shape
/// with an empty body; the kind is carried by the destination topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub body: String,
    pub sender: String,
    pub content_id: ContentId,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_tagged_json() {
        let frame = Frame::Publish {
            topic: Topic::watch_party(&RoomCode::parse("WXYZ").unwrap()),
            body: serde_json::json!({"content_id": "abc123"}),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"Publish\""));
        assert!(json.contains("watch-party/WXYZ"));

        match serde_json::from_str::<Frame>(&json).unwrap() {
            Frame::Publish { topic, body } => {
                assert_eq!(topic.as_str(), "watch-party/WXYZ");
                assert_eq!(body["content_id"], "abc123");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn chat_topics_are_distinct_per_destination() {
        let content = ContentId::from("abc123");
        let chat = Topic::chat(&content);
        let join = Topic::join(&content);
        let leave = Topic::leave(&content);
        assert_eq!(chat.as_str(), "video/abc123/chat");
        assert_ne!(chat, join);
        assert_ne!(join, leave);
    }
}
