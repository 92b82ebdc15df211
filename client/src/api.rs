//! REST client for the authoritative watch-party server.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::content::ContentId;
use crate::identity::Identity;
use crate::offset::OffsetSource;
use crate::room_code::RoomCode;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not signed in")]
    Unauthenticated,

    #[error("room not found")]
    NotFound,

    #[error("unexpected response (HTTP {0})")]
    Unexpected(u16),
}

/// Room lifecycle state as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_code: RoomCode,
    pub active: bool,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    host_name: &'a str,
}

/// HTTP client for room lifecycle calls and the authoritative offset query.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    identity: Identity,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `https://example.com/api`.
    pub fn new(base_url: impl Into<String>, identity: Identity) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method, &url);
        if let Some(token) = self.identity.bearer() {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Create a new room; the caller becomes host. Requires a signed-in
    /// identity, since the server rejects anonymous hosts.
    pub async fn create_room(&self) -> Result<RoomInfo, ApiError> {
        if !self.identity.is_authenticated() {
            return Err(ApiError::Unauthenticated);
        }
        let resp = self
            .request(Method::POST, "/watch-party/create")
            .json(&CreateRoomRequest {
                host_name: self.identity.display_name(),
            })
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(resp.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthenticated),
            status => Err(ApiError::Unexpected(status.as_u16())),
        }
    }

    /// Look up a room by its canonical code.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomInfo, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/watch-party/{code}"))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(ApiError::Unexpected(status.as_u16())),
        }
    }

    /// Mark a room inactive. Idempotent from the client's perspective:
    /// closing an already-closed room succeeds and re-reports inactive.
    pub async fn close_room(&self, code: &RoomCode) -> Result<(), ApiError> {
        let resp = self
            .request(Method::POST, &format!("/watch-party/{code}/close"))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthenticated),
            status => Err(ApiError::Unexpected(status.as_u16())),
        }
    }

    /// Query the server-authoritative playback offset for a scheduled
    /// broadcast. Signed seconds; negative means not started yet.
    pub async fn fetch_offset(&self, content: &ContentId) -> Result<f64, ApiError> {
        let resp = self
            .request(Method::GET, &format!("/video-posts/{content}/offset"))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(ApiError::Unexpected(status.as_u16())),
        }
    }
}

#[async_trait]
impl OffsetSource for ApiClient {
    async fn playback_offset(&self, content: &ContentId) -> anyhow::Result<f64> {
        Ok(self.fetch_offset(content).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = ApiClient::new("https://example.com/api/", Identity::anonymous("viewer"));
        assert_eq!(api.base_url(), "https://example.com/api");
    }

    #[tokio::test]
    async fn create_room_requires_credentials() {
        let api = ApiClient::new("https://example.com/api", Identity::anonymous("viewer"));
        match api.create_room().await {
            Err(ApiError::Unauthenticated) => {}
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
    }

    #[test]
    fn room_info_deserializes_without_creator() {
        let info: RoomInfo =
            serde_json::from_str(r#"{"room_code":"AB12","active":true}"#).unwrap();
        assert_eq!(info.room_code.as_str(), "AB12");
        assert!(info.active);
        assert!(info.created_by.is_none());
    }
}
