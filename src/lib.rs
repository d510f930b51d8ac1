//! OAuth 2.0 Device Authorization Grant (RFC 8628) client.
//!
//! [`AuthFlowController`] drives one device flow at a time against any
//! [`OAuthProviderClient`]: request a device code, publish the user code for
//! out-of-band approval, poll the token endpoint, then fetch the user's
//! profile. [`HttpProviderClient`] talks to a real authorization server.

mod client;
mod config;
mod controller;
mod error;
mod provider;
mod retry;
mod session;
mod types;

pub use client::{Endpoints, HttpProviderClient};
pub use config::{DeviceFlowConfig, PollPolicy};
pub use controller::AuthFlowController;
pub use error::{FlowError, OAuthError};
pub use provider::{OAuthProviderClient, TokenPoll};
pub use retry::AuthorizeRetry;
pub use session::{AuthSession, AuthState, DeviceCodes};
pub use types::{DeviceAuthorizationResponse, TokenErrorResponse, TokenResponse, UserProfile};
