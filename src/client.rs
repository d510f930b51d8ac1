use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    DeviceAuthorizationResponse, DeviceFlowConfig, OAuthError, OAuthProviderClient,
    TokenErrorResponse, TokenPoll, TokenResponse, UserProfile,
};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub device_authorize: String,
    pub token: String,
    pub userinfo: String,
}

impl Endpoints {
    pub fn from_issuer(issuer: &str) -> Result<Self, OAuthError> {
        let base = issuer.trim_end_matches('/');
        let url = Url::parse(base)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OAuthError::InvalidIssuer(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        Ok(Self {
            device_authorize: format!("{base}/v1/device/authorize"),
            token: format!("{base}/v1/token"),
            userinfo: format!("{base}/v1/userinfo"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    config: DeviceFlowConfig,
    endpoints: Endpoints,
    http: Client,
}

impl HttpProviderClient {
    pub fn new(config: DeviceFlowConfig) -> Result<Self, OAuthError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let endpoints = Endpoints::from_issuer(&config.issuer)?;
        Ok(Self {
            config,
            endpoints,
            http,
        })
    }

    pub fn with_http_client(config: DeviceFlowConfig, http: Client) -> Result<Self, OAuthError> {
        let endpoints = Endpoints::from_issuer(&config.issuer)?;
        Ok(Self {
            config,
            endpoints,
            http,
        })
    }

    /// Overrides the issuer derived endpoints for servers with a different layout.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn config(&self) -> &DeviceFlowConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl OAuthProviderClient for HttpProviderClient {
    async fn device_authorize(&self) -> Result<DeviceAuthorizationResponse, OAuthError> {
        let scope = self.config.scope();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.endpoints.device_authorize)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "device authorization response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OAuthError::RateLimited);
        }

        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            let error: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let message = error.message().unwrap_or_else(|| status_line(status));
            return Err(OAuthError::AuthorizationRejected { message });
        }

        if !status.is_success() {
            return Err(status_error(status));
        }

        let body: DeviceAuthorizationResponse = read_json(response).await?;
        body.validate()
    }

    async fn poll_token(&self, device_code: &str) -> Result<TokenPoll, OAuthError> {
        let params = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.config.client_id.as_str()),
            ("device_code", device_code),
        ];

        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(match serde_json::from_str::<TokenResponse>(&body) {
                Ok(token) if !token.access_token.is_empty() => TokenPoll::Granted(token),
                _ => TokenPoll::UnexpectedStatus(status.as_u16()),
            });
        }

        match status {
            StatusCode::BAD_REQUEST => {
                let error: TokenErrorResponse =
                    serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
                        message: err.to_string(),
                        body,
                    })?;
                Ok(classify_token_error(error))
            }
            StatusCode::TOO_MANY_REQUESTS => Ok(TokenPoll::RateLimited),
            other => Ok(TokenPoll::UnexpectedStatus(other.as_u16())),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, OAuthError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        read_json(response).await
    }
}

fn classify_token_error(error: TokenErrorResponse) -> TokenPoll {
    match error.error.as_deref() {
        Some("authorization_pending") => TokenPoll::Pending,
        Some("expired_token") => TokenPoll::Expired,
        _ => TokenPoll::Rejected {
            error: error.error.unwrap_or_default(),
            description: error.error_description,
        },
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, OAuthError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body,
    })
}

fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
}

fn status_error(status: StatusCode) -> OAuthError {
    OAuthError::HttpStatus {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
    }
}
