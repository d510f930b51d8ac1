use async_trait::async_trait;

use crate::{DeviceAuthorizationResponse, OAuthError, TokenResponse, UserProfile};

/// Classified outcome of a single token poll.
#[derive(Debug, Clone)]
pub enum TokenPoll {
    Granted(TokenResponse),
    /// `authorization_pending`: the user has not approved yet.
    Pending,
    /// `expired_token`: the device code is no longer valid.
    Expired,
    /// Any other `error` value in a 400 body.
    Rejected {
        error: String,
        description: Option<String>,
    },
    RateLimited,
    UnexpectedStatus(u16),
}

/// The three endpoints of an RFC 8628 authorization server.
#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    /// A single device authorization request; retries are the caller's concern.
    async fn device_authorize(&self) -> Result<DeviceAuthorizationResponse, OAuthError>;

    /// `Err` is reserved for transport failures and unreadable bodies.
    async fn poll_token(&self, device_code: &str) -> Result<TokenPoll, OAuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, OAuthError>;
}
