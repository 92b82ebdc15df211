//! Client library for synchronized scheduled playback and watch parties.
//!
//! Two independent pieces share one server:
//!
//! * [`controller::SyncController`] keeps a local player locked to a
//!   server-scheduled broadcast timeline (countdown, drift correction,
//!   free playback once the window elapses).
//! * [`party::WatchParty`] and [`chat::VideoChat`] ride the real-time relay:
//!   room-scoped play events and per-content chat with join/leave presence.
//!
//! The embedding application supplies the actual video player behind the
//! [`player::MediaSurface`] trait and drives everything else through this
//! crate.

pub mod api;
pub mod channel;
pub mod chat;
pub mod content;
pub mod controller;
pub mod drift;
pub mod identity;
pub mod offset;
pub mod party;
pub mod player;
pub mod protocol;
pub mod relay;
pub mod room_code;

pub use api::{ApiClient, ApiError, RoomInfo};
pub use channel::{ChannelError, ChannelStatus, PubSubChannel};
pub use chat::{ChatEvent, VideoChat};
pub use content::{ContentDescriptor, ContentId};
pub use controller::{SyncController, SyncPhase, SyncSnapshot};
pub use drift::{Correction, DriftCorrector, MAX_DRIFT_SECS};
pub use identity::Identity;
pub use offset::OffsetSource;
pub use party::{share_link, PartyError, WatchParty};
pub use player::MediaSurface;
pub use protocol::{ChatMessage, Frame, PlayEvent, Topic};
pub use relay::RoomRelay;
pub use room_code::{RoomCode, RoomCodeError};
