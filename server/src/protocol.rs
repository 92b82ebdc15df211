use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames exchanged with relay clients (must match the client wire types).
///
/// Publish bodies are opaque: the relay fans them out verbatim and never
/// interprets payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Frame {
    // Client -> Server
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, body: Value },

    // Server -> Client
    Subscribed { topic: String },
    Event { topic: String, body: Value },
    Error { message: String },
}

/// Room state as reported over the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct RoomDto {
    pub room_code: String,
    pub active: bool,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub host_name: String,
}
