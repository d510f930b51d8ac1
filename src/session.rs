use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::{DeviceAuthorizationResponse, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Initializing,
    QrDisplay,
    Polling,
    Authenticated,
    Error,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::QrDisplay => "qr_display",
            Self::Polling => "polling",
            Self::Authenticated => "authenticated",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Error)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The code triple handed out by the device authorization endpoint. Always
/// set and cleared as a unit.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCodes {
    #[serde(skip_serializing)]
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
}

impl DeviceCodes {
    /// Expects a response that already passed validation.
    pub(crate) fn from_response(response: &DeviceAuthorizationResponse) -> Option<Self> {
        Some(Self {
            device_code: response.device_code.clone()?,
            user_code: response.user_code.clone()?,
            verification_uri: response.verification_uri.clone()?,
            verification_uri_complete: response.verification_uri_complete.clone(),
        })
    }
}

impl fmt::Debug for DeviceCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodes")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .finish()
    }
}

/// Snapshot of one device flow cycle, as published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthSession {
    pub state: AuthState,
    #[serde(flatten)]
    pub codes: Option<DeviceCodes>,
    #[serde(
        rename = "poll_interval_seconds",
        serialize_with = "serialize_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub poll_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl AuthSession {
    pub fn device_code(&self) -> Option<&str> {
        self.codes.as_ref().map(|codes| codes.device_code.as_str())
    }

    pub fn user_code(&self) -> Option<&str> {
        self.codes.as_ref().map(|codes| codes.user_code.as_str())
    }

    pub fn verification_uri(&self) -> Option<&str> {
        self.codes.as_ref().map(|codes| codes.verification_uri.as_str())
    }

    /// Clears every field and returns to `initializing`.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.state = AuthState::Error;
        self.error_reason = Some(reason);
    }
}

fn serialize_secs<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&duration.as_secs()),
        None => serializer.serialize_none(),
    }
}
