//! Live chat scoped to a video.
//!
//! Structurally the same pub/sub transport as the room relay, but scoped by
//! content id and with three logical destinations per video: messages, join
//! notifications, and leave notifications. Join/leave reuse the message
//! envelope with an empty body; the kind comes from the topic. Chat and the
//! room relay are independent connections, so closing one never affects the
//! other.

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::channel::{relay_url, ChannelError, ChannelStatus, PubSubChannel};
use crate::content::ContentId;
use crate::identity::Identity;
use crate::protocol::{ChatMessage, Topic};

/// A chat event as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Joined(ChatMessage),
    Left(ChatMessage),
}

struct ChatSession {
    content: ContentId,
    channel: PubSubChannel,
}

pub struct VideoChat {
    api_base: String,
    identity: Identity,
    session: Mutex<Option<ChatSession>>,
}

impl VideoChat {
    pub fn new(api_base: impl Into<String>, identity: Identity) -> Self {
        Self {
            api_base: api_base.into(),
            identity,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to a video's chat and announce this viewer once the
    /// subscriptions are confirmed. A previous session for another video is
    /// torn down first (with its leave notification).
    pub fn connect<F>(&self, content: &ContentId, on_event: F) -> Result<(), ChannelError>
    where
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        self.disconnect();

        let url = relay_url(&self.api_base, self.identity.bearer())?;
        let chat_topic = Topic::chat(content);
        let join_topic = Topic::join(content);
        let leave_topic = Topic::leave(content);

        let (ready_tx, ready_rx) = oneshot::channel();
        let dispatch = {
            let chat_topic = chat_topic.clone();
            let join_topic = join_topic.clone();
            let leave_topic = leave_topic.clone();
            move |topic: Topic, body: serde_json::Value| {
                let message = match serde_json::from_value::<ChatMessage>(body) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("dropping malformed chat message on {topic}: {e}");
                        return;
                    }
                };
                if topic == chat_topic {
                    on_event(ChatEvent::Message(message));
                } else if topic == join_topic {
                    on_event(ChatEvent::Joined(message));
                } else if topic == leave_topic {
                    on_event(ChatEvent::Left(message));
                } else {
                    tracing::warn!("chat event on unexpected topic {topic}");
                }
            }
        };

        let channel = PubSubChannel::open(
            url,
            vec![chat_topic, join_topic.clone(), leave_topic],
            move || {
                let _ = ready_tx.send(());
            },
            Box::new(dispatch),
        );

        // Announce ourselves once the subscription set is confirmed, so we
        // also receive the echo of our own join.
        let announce = channel.clone();
        let join_body = self.notification(content);
        tokio::spawn(async move {
            if ready_rx.await.is_ok() {
                match serde_json::to_value(&join_body) {
                    Ok(body) => {
                        if let Err(e) = announce.publish(join_topic, body) {
                            tracing::warn!("failed to announce chat join: {e}");
                        }
                    }
                    Err(e) => tracing::error!("failed to serialize join notification: {e}"),
                }
            }
        });

        *self.session.lock() = Some(ChatSession {
            content: content.clone(),
            channel,
        });
        Ok(())
    }

    /// Publish a chat line to the currently connected video.
    pub fn send(&self, body: &str) -> Result<(), ChannelError> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(ChannelError::NotConnected)?;
        let message = ChatMessage {
            body: body.to_string(),
            sender: self.identity.display_name().to_string(),
            content_id: session.content.clone(),
            timestamp: Utc::now(),
        };
        session
            .channel
            .publish(Topic::chat(&session.content), serde_json::to_value(&message)?)
    }

    /// Emit a leave notification, then tear down the transport. Safe to call
    /// when already disconnected.
    pub fn disconnect(&self) {
        if let Some(session) = self.session.lock().take() {
            let leave = self.notification(&session.content);
            match serde_json::to_value(&leave) {
                Ok(body) => {
                    if let Err(e) = session.channel.publish(Topic::leave(&session.content), body) {
                        tracing::debug!("leave notification not delivered: {e}");
                    }
                }
                Err(e) => tracing::error!("failed to serialize leave notification: {e}"),
            }
            session.channel.disconnect();
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.channel.status())
            .unwrap_or(ChannelStatus::Disconnected)
    }

    /// Join/leave share the message envelope with an empty body.
    fn notification(&self, content: &ContentId) -> ChatMessage {
        ChatMessage {
            body: String::new(),
            sender: self.identity.display_name().to_string(),
            content_id: content.clone(),
            timestamp: Utc::now(),
        }
    }
}

impl Drop for VideoChat {
    fn drop(&mut self) {
        self.disconnect();
    }
}
