use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid issuer url: {0}")]
    InvalidIssuer(String),

    #[error("rate limited by authorization server")]
    RateLimited,

    #[error("authorization request rejected: {message}")]
    AuthorizationRejected { message: String },

    #[error("http status {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("missing required fields: {}", .missing.join(", "))]
    MalformedResponse { missing: Vec<&'static str> },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },
}

impl OAuthError {
    /// Whether the authorize request may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            _ => false,
        }
    }
}

/// Failures that end a flow cycle. The `Display` output is what gets
/// published as the session's error reason.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Failed to initialize device authorization: {}", describe_authorize(.0))]
    Authorize(OAuthError),

    #[error("Device code expired. Please try again.")]
    ExpiredToken,

    #[error("Authentication timeout. Please try again.")]
    Timeout,

    #[error("Failed to fetch user profile: {}", describe_profile(.0))]
    ProfileFetch(OAuthError),
}

fn describe_authorize(err: &OAuthError) -> String {
    match err {
        OAuthError::RateLimited => "Rate limited. Please wait a moment and try again.".to_string(),
        OAuthError::AuthorizationRejected { message } => {
            format!("Device authorization failed: {message}")
        }
        OAuthError::HttpStatus { status, reason } => {
            format!("Device authorization failed: {status} {reason}")
        }
        OAuthError::MalformedResponse { missing } => format!(
            "Invalid device authorization response: missing {}",
            missing.join(", ")
        ),
        OAuthError::InvalidResponse { message, .. } => {
            format!("Invalid device authorization response: {message}")
        }
        other => other.to_string(),
    }
}

fn describe_profile(err: &OAuthError) -> String {
    match err {
        OAuthError::HttpStatus { status, .. } => {
            format!("User info request failed: {status}")
        }
        other => other.to_string(),
    }
}
