//! Real-time fan-out of play events to the members of a watch-party room.

use parking_lot::Mutex;

use crate::channel::{relay_url, ChannelError, ChannelStatus, PubSubChannel};
use crate::identity::Identity;
use crate::protocol::{PlayEvent, Topic};
use crate::room_code::RoomCode;

/// One room subscription per client: connecting to a new room tears down the
/// previous channel first.
pub struct RoomRelay {
    api_base: String,
    identity: Identity,
    channel: Mutex<Option<PubSubChannel>>,
}

impl RoomRelay {
    pub fn new(api_base: impl Into<String>, identity: Identity) -> Self {
        Self {
            api_base: api_base.into(),
            identity,
            channel: Mutex::new(None),
        }
    }

    /// Subscribe to a room's play events. `on_ready` fires exactly once, after
    /// the subscription is confirmed active — callers must not assume
    /// synchronous readiness. Every received event is handed to `on_play`,
    /// including echoes of this client's own publishes.
    pub fn connect<R, F>(&self, code: &RoomCode, on_ready: R, on_play: F) -> Result<(), ChannelError>
    where
        R: FnOnce() + Send + 'static,
        F: Fn(PlayEvent) + Send + Sync + 'static,
    {
        self.disconnect();

        let url = relay_url(&self.api_base, self.identity.bearer())?;
        let topic = Topic::watch_party(code);

        let channel = PubSubChannel::open(
            url,
            vec![topic],
            on_ready,
            Box::new(move |topic, body| match serde_json::from_value::<PlayEvent>(body) {
                Ok(event) => on_play(event),
                Err(e) => tracing::warn!("dropping malformed play event on {topic}: {e}"),
            }),
        );

        *self.channel.lock() = Some(channel);
        Ok(())
    }

    /// Host-side broadcast. Best-effort; no acknowledgment is awaited.
    pub fn publish(&self, code: &RoomCode, event: &PlayEvent) -> Result<(), ChannelError> {
        let guard = self.channel.lock();
        let channel = guard.as_ref().ok_or(ChannelError::NotConnected)?;
        channel.publish(Topic::watch_party(code), serde_json::to_value(event)?)
    }

    /// Idempotent teardown.
    pub fn disconnect(&self) {
        if let Some(channel) = self.channel.lock().take() {
            channel.disconnect();
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.channel
            .lock()
            .as_ref()
            .map(|channel| channel.status())
            .unwrap_or(ChannelStatus::Disconnected)
    }
}

impl Drop for RoomRelay {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_relay_reports_status_and_rejects_publish() {
        let relay = RoomRelay::new("http://127.0.0.1:1/api", Identity::anonymous("viewer"));
        assert_eq!(relay.status(), ChannelStatus::Disconnected);

        let code = RoomCode::parse("WXYZ").unwrap();
        let event = PlayEvent {
            content_id: "abc123".into(),
            title: "Premiere".to_string(),
            host_name: "host".to_string(),
        };
        assert!(matches!(
            relay.publish(&code, &event),
            Err(ChannelError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn double_disconnect_is_a_no_op() {
        let relay = RoomRelay::new("http://127.0.0.1:1/api", Identity::anonymous("viewer"));
        relay
            .connect(&RoomCode::parse("WXYZ").unwrap(), || {}, |_| {})
            .unwrap();
        relay.disconnect();
        relay.disconnect();
        assert_eq!(relay.status(), ChannelStatus::Disconnected);
    }
}
