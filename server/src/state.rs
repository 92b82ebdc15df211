use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::{Frame, RoomDto};

/// Unambiguous uppercase alphabet for room codes: no 0/O, 1/I/L, 2/Z, 5/S.
const CODE_ALPHABET: &[u8] = b"346789ABCDEFGHJKMNPQRTUVWXY";
const CODE_LENGTH: usize = 4;

/// A watch-party room. Rooms outlive member connections; only an explicit
/// close deactivates one.
#[derive(Debug, Clone)]
pub struct Room {
    pub active: bool,
    pub created_by: String,
}

/// Shared server state: room registry plus the relay subscription table.
#[derive(Clone)]
pub struct ServerState {
    /// All rooms, keyed by canonical room code.
    rooms: Arc<DashMap<String, Room>>,
    /// Relay subscriptions: topic -> per-connection frame senders.
    subscriptions: Arc<DashMap<String, HashMap<Uuid, UnboundedSender<Frame>>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    pub fn create_room(&self, created_by: &str) -> RoomDto {
        let code = self.generate_room_code();
        self.rooms.insert(
            code.clone(),
            Room {
                active: true,
                created_by: created_by.to_string(),
            },
        );
        tracing::info!("room {} created by {}", code, created_by);
        RoomDto {
            room_code: code,
            active: true,
            created_by: Some(created_by.to_string()),
        }
    }

    pub fn get_room(&self, code: &str) -> Option<RoomDto> {
        self.rooms.get(code).map(|room| RoomDto {
            room_code: code.to_string(),
            active: room.active,
            created_by: Some(room.created_by.clone()),
        })
    }

    /// Deactivate a room. Idempotent: closing an already-closed room simply
    /// re-reports inactive. Returns false only for unknown codes.
    pub fn close_room(&self, code: &str) -> bool {
        match self.rooms.get_mut(code) {
            Some(mut room) => {
                if room.active {
                    room.active = false;
                    tracing::info!("room {} closed", code);
                }
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self, topic: &str, connection: Uuid, tx: UnboundedSender<Frame>) {
        self.subscriptions
            .entry(topic.to_string())
            .or_default()
            .insert(connection, tx);
        tracing::debug!("connection {} subscribed to {}", connection, topic);
    }

    pub fn unsubscribe(&self, topic: &str, connection: Uuid) {
        if let Some(mut subscribers) = self.subscriptions.get_mut(topic) {
            subscribers.remove(&connection);
            if subscribers.is_empty() {
                drop(subscribers);
                self.subscriptions.remove(topic);
            }
        }
    }

    /// Remove a dropped connection from every topic it subscribed to.
    pub fn drop_connection(&self, connection: Uuid) {
        let emptied: Vec<String> = self
            .subscriptions
            .iter_mut()
            .filter_map(|mut entry| {
                entry.value_mut().remove(&connection);
                entry.value().is_empty().then(|| entry.key().clone())
            })
            .collect();
        for topic in emptied {
            self.subscriptions.remove(&topic);
        }
    }

    /// Fan a published body out to every subscriber of the topic, the
    /// publisher's own subscription included. Returns how many subscribers
    /// were delivered to.
    pub fn publish(&self, topic: &str, body: serde_json::Value) -> usize {
        let Some(subscribers) = self.subscriptions.get(topic) else {
            return 0;
        };
        let event = Frame::Event {
            topic: topic.to_string(),
            body,
        };
        let mut delivered = 0;
        for tx in subscribers.values() {
            // A closed receiver just means the connection is mid-teardown;
            // drop_connection will reap it.
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!("published to {} ({} subscribers)", topic, delivered);
        delivered
    }

    fn generate_room_code(&self) -> String {
        loop {
            let raw = Uuid::new_v4();
            let code: String = raw
                .as_bytes()
                .iter()
                .take(CODE_LENGTH)
                .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                break code;
            }
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn subscriber(state: &ServerState, topic: &str) -> (Uuid, UnboundedReceiver<Frame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        state.subscribe(topic, id, tx);
        (id, rx)
    }

    fn body_of(frame: Frame) -> serde_json::Value {
        match frame {
            Frame::Event { body, .. } => body,
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[test]
    fn room_codes_use_the_unambiguous_alphabet() {
        let state = ServerState::new();
        for _ in 0..50 {
            let room = state.create_room("host");
            assert_eq!(room.room_code.len(), CODE_LENGTH);
            assert!(room
                .room_code
                .bytes()
                .all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn created_room_is_active_and_retrievable() {
        let state = ServerState::new();
        let created = state.create_room("host");
        let fetched = state.get_room(&created.room_code).unwrap();
        assert!(fetched.active);
        assert_eq!(fetched.created_by.as_deref(), Some("host"));
        assert!(state.get_room("QQQQ").is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let state = ServerState::new();
        let room = state.create_room("host");
        assert!(state.close_room(&room.room_code));
        assert!(state.close_room(&room.room_code));
        assert!(!state.get_room(&room.room_code).unwrap().active);
        assert!(!state.close_room("QQQQ"));
    }

    #[test]
    fn publish_fans_out_to_all_subscribers_including_publisher() {
        let state = ServerState::new();
        let topic = "watch-party/AB34";
        let (_host, mut host_rx) = subscriber(&state, topic);
        let (_guest, mut guest_rx) = subscriber(&state, topic);

        let delivered = state.publish(topic, json!({"title": "Premiere"}));
        assert_eq!(delivered, 2);
        assert_eq!(body_of(host_rx.try_recv().unwrap())["title"], "Premiere");
        assert_eq!(body_of(guest_rx.try_recv().unwrap())["title"], "Premiere");
    }

    #[test]
    fn late_joiner_receives_subsequent_events_only() {
        let state = ServerState::new();
        let topic = "watch-party/AB34";
        let (_host, mut host_rx) = subscriber(&state, topic);

        state.publish(topic, json!({"n": 1}));
        let (_late, mut late_rx) = subscriber(&state, topic);
        state.publish(topic, json!({"n": 2}));

        assert_eq!(body_of(host_rx.try_recv().unwrap())["n"], 1);
        assert_eq!(body_of(host_rx.try_recv().unwrap())["n"], 2);
        assert_eq!(body_of(late_rx.try_recv().unwrap())["n"], 2);
        assert!(late_rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_and_drop_stop_delivery() {
        let state = ServerState::new();
        let topic = "video/abc123/chat";
        let (a, mut a_rx) = subscriber(&state, topic);
        let (b, _b_rx) = subscriber(&state, topic);

        state.unsubscribe(topic, b);
        assert_eq!(state.publish(topic, json!({})), 1);
        assert!(a_rx.try_recv().is_ok());

        state.drop_connection(a);
        assert_eq!(state.publish(topic, json!({})), 0);
    }

    #[test]
    fn publish_to_unknown_topic_is_a_no_op() {
        let state = ServerState::new();
        assert_eq!(state.publish("watch-party/ZZZZ", json!({})), 0);
    }
}
