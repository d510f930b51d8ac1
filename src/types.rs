use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::OAuthError;

/// Body of a successful `/device/authorize` response. Required fields are
/// optional here so their absence can be reported by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl DeviceAuthorizationResponse {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("device_code", &self.device_code),
            ("user_code", &self.user_code),
            ("verification_uri", &self.verification_uri),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn validate(self) -> Result<Self, OAuthError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(self)
        } else {
            Err(OAuthError::MalformedResponse { missing })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Provider description, falling back to the error code.
    pub fn message(&self) -> Option<String> {
        self.error_description
            .clone()
            .filter(|description| !description.is_empty())
            .or_else(|| self.error.clone())
    }
}

/// Claims returned by the userinfo endpoint, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email_verified: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::{DeviceAuthorizationResponse, TokenErrorResponse, UserProfile};
    use crate::OAuthError;

    #[test]
    fn validate_reports_every_missing_field() {
        let response: DeviceAuthorizationResponse =
            serde_json::from_str(r#"{"user_code": "", "interval": 5}"#).unwrap();
        let result = response.validate();
        match result {
            Err(OAuthError::MalformedResponse { missing }) => {
                assert_eq!(missing, vec!["device_code", "user_code", "verification_uri"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_complete_response() {
        let response: DeviceAuthorizationResponse = serde_json::from_str(
            r#"{
                "device_code": "dev-1",
                "user_code": "WDJB-MJHT",
                "verification_uri": "https://idp.example.com/activate",
                "expires_in": 600
            }"#,
        )
        .unwrap();
        let response = response.validate().unwrap();
        assert_eq!(response.interval, None);
        assert_eq!(response.expires_in, Some(600));
    }

    #[test]
    fn error_message_prefers_description() {
        let body = TokenErrorResponse {
            error: Some("invalid_client".to_string()),
            error_description: Some("Client authentication failed".to_string()),
        };
        assert_eq!(body.message().as_deref(), Some("Client authentication failed"));

        let body = TokenErrorResponse {
            error: Some("invalid_client".to_string()),
            error_description: None,
        };
        assert_eq!(body.message().as_deref(), Some("invalid_client"));
    }

    #[test]
    fn profile_keeps_unknown_claims() {
        let profile: UserProfile = serde_json::from_str(
            r#"{
                "sub": "00u1",
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "email_verified": true,
                "locale": "en-GB"
            }"#,
        )
        .unwrap();
        assert_eq!(profile.sub.as_deref(), Some("00u1"));
        assert_eq!(profile.email_verified, Some(true));
        assert_eq!(profile.extra.get("locale").and_then(|v| v.as_str()), Some("en-GB"));
    }
}
