//! Watch-party lifecycle: hosting, joining, leaving, closing.
//!
//! A party is identified by its room code. The host creates the room over
//! the HTTP API and announces playback on the relay; guests resolve the code
//! over the API and subscribe to the same relay topic. One active party per
//! client; starting or joining another tears the previous one down.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiClient, ApiError, RoomInfo};
use crate::channel::{ChannelError, ChannelStatus};
use crate::content::ContentDescriptor;
use crate::identity::Identity;
use crate::protocol::PlayEvent;
use crate::relay::RoomRelay;
use crate::room_code::{RoomCode, RoomCodeError};

#[derive(Debug, Error)]
pub enum PartyError {
    #[error(transparent)]
    Code(#[from] RoomCodeError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("room {0} is no longer active")]
    RoomClosed(RoomCode),
    #[error("not hosting a party")]
    NotHosting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Host,
    Guest,
}

struct ActiveParty {
    code: RoomCode,
    role: Role,
}

pub struct WatchParty {
    api: ApiClient,
    relay: Arc<RoomRelay>,
    identity: Identity,
    active: Mutex<Option<ActiveParty>>,
}

impl WatchParty {
    pub fn new(api_base: impl Into<String>, identity: Identity) -> Self {
        let api_base = api_base.into();
        Self {
            api: ApiClient::new(api_base.clone(), identity.clone()),
            relay: Arc::new(RoomRelay::new(api_base, identity.clone())),
            identity,
            active: Mutex::new(None),
        }
    }

    /// Create a room and start broadcasting the given content. The play
    /// event is announced once the relay subscription is confirmed, so
    /// guests who joined before the announcement still receive it live.
    /// Requires an authenticated identity.
    pub async fn host<F>(
        &self,
        content: &ContentDescriptor,
        on_play: F,
    ) -> Result<RoomCode, PartyError>
    where
        F: Fn(PlayEvent) + Send + Sync + 'static,
    {
        self.leave();

        let room = self.api.create_room().await?;
        let code = room.room_code.clone();

        let event = PlayEvent {
            content_id: content.content_id.clone(),
            title: content.title.clone(),
            host_name: self.identity.display_name().to_string(),
        };
        let relay = Arc::clone(&self.relay);
        let announce_code = code.clone();
        self.relay.connect(
            &code,
            move || {
                if let Err(e) = relay.publish(&announce_code, &event) {
                    tracing::warn!("failed to announce playback to {announce_code}: {e}");
                }
            },
            on_play,
        )?;

        *self.active.lock() = Some(ActiveParty {
            code: code.clone(),
            role: Role::Host,
        });
        tracing::info!("hosting watch party {code}");
        Ok(code)
    }

    /// Join an existing party by (raw, user-typed) room code. The code is
    /// canonicalized before lookup; a room that exists but was closed by its
    /// host is rejected.
    pub async fn join<F>(&self, raw_code: &str, on_play: F) -> Result<RoomInfo, PartyError>
    where
        F: Fn(PlayEvent) + Send + Sync + 'static,
    {
        let code = RoomCode::parse(raw_code)?;
        let room = self.api.get_room(&code).await?;
        if !room.active {
            return Err(PartyError::RoomClosed(code));
        }

        self.leave();
        let joined = code.clone();
        self.relay.connect(
            &code,
            move || tracing::debug!("joined watch party {joined}"),
            on_play,
        )?;

        *self.active.lock() = Some(ActiveParty {
            code,
            role: Role::Guest,
        });
        Ok(room)
    }

    /// Drop out of the current party, if any. Guests just unsubscribe; the
    /// room itself keeps running.
    pub fn leave(&self) {
        if self.active.lock().take().is_some() {
            self.relay.disconnect();
        }
    }

    /// Host-only: close the room for everyone, then disconnect locally.
    /// Closing an already-closed room on the server side is harmless.
    pub async fn close(&self) -> Result<(), PartyError> {
        let code = {
            let active = self.active.lock();
            match active.as_ref() {
                Some(party) if party.role == Role::Host => party.code.clone(),
                _ => return Err(PartyError::NotHosting),
            }
        };
        self.api.close_room(&code).await?;
        self.leave();
        tracing::info!("closed watch party {code}");
        Ok(())
    }

    pub fn current_code(&self) -> Option<RoomCode> {
        self.active.lock().as_ref().map(|party| party.code.clone())
    }

    pub fn is_hosting(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|party| party.role == Role::Host)
    }

    pub fn status(&self) -> ChannelStatus {
        self.relay.status()
    }
}

/// Shareable invite URL for a room, e.g. `https://example.org/watch-party/AB12`.
pub fn share_link(origin: &str, code: &RoomCode) -> String {
    format!("{}/watch-party/{}", origin.trim_end_matches('/'), code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party() -> WatchParty {
        WatchParty::new("http://127.0.0.1:1/api", Identity::new("host", "token"))
    }

    #[tokio::test]
    async fn join_rejects_malformed_codes_before_any_lookup() {
        let party = party();
        match party.join("not-a-code", |_| {}).await {
            Err(PartyError::Code(RoomCodeError::Malformed)) => {}
            other => panic!("expected malformed-code error, got {other:?}"),
        }
        assert!(party.current_code().is_none());
    }

    #[tokio::test]
    async fn close_without_hosting_is_an_error() {
        let party = party();
        assert!(matches!(party.close().await, Err(PartyError::NotHosting)));
    }

    #[test]
    fn share_link_is_origin_plus_code() {
        let code = RoomCode::parse("ab12").unwrap();
        assert_eq!(
            share_link("https://example.org", &code),
            "https://example.org/watch-party/AB12"
        );
        assert_eq!(
            share_link("https://example.org/", &code),
            "https://example.org/watch-party/AB12"
        );
    }

    #[test]
    fn leave_with_no_party_is_a_no_op() {
        party().leave();
    }
}
