#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scanner_auth::{
    DeviceAuthorizationResponse, OAuthError, OAuthProviderClient, TokenPoll, TokenResponse,
    UserProfile,
};
use tokio::time::Instant;

/// In-memory provider that replays scripted responses and records when each
/// endpoint was called.
pub struct ScriptedProvider {
    authorize: Mutex<VecDeque<Result<DeviceAuthorizationResponse, OAuthError>>>,
    polls: Mutex<VecDeque<Result<TokenPoll, OAuthError>>>,
    profile: Mutex<Option<Result<UserProfile, OAuthError>>>,
    poll_delay: Duration,
    authorize_calls: Mutex<Vec<Instant>>,
    poll_calls: Mutex<Vec<Instant>>,
    profile_calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            authorize: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            profile: Mutex::new(Some(Ok(profile()))),
            poll_delay: Duration::ZERO,
            authorize_calls: Mutex::new(Vec::new()),
            poll_calls: Mutex::new(Vec::new()),
            profile_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn authorize(self, result: Result<DeviceAuthorizationResponse, OAuthError>) -> Self {
        self.authorize.lock().unwrap().push_back(result);
        self
    }

    /// Queues a token poll outcome; once the queue is empty every poll is pending.
    pub fn poll(self, result: Result<TokenPoll, OAuthError>) -> Self {
        self.polls.lock().unwrap().push_back(result);
        self
    }

    pub fn pending(mut self, times: usize) -> Self {
        for _ in 0..times {
            self = self.poll(Ok(TokenPoll::Pending));
        }
        self
    }

    pub fn granted(self) -> Self {
        self.poll(Ok(TokenPoll::Granted(token())))
    }

    pub fn profile_result(self, result: Result<UserProfile, OAuthError>) -> Self {
        *self.profile.lock().unwrap() = Some(result);
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn authorize_calls(&self) -> Vec<Instant> {
        self.authorize_calls.lock().unwrap().clone()
    }

    pub fn poll_calls(&self) -> Vec<Instant> {
        self.poll_calls.lock().unwrap().clone()
    }

    pub fn profile_calls(&self) -> Vec<String> {
        self.profile_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthProviderClient for ScriptedProvider {
    async fn device_authorize(&self) -> Result<DeviceAuthorizationResponse, OAuthError> {
        self.authorize_calls.lock().unwrap().push(Instant::now());
        self.authorize
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(device_response(Some(5))))
    }

    async fn poll_token(&self, device_code: &str) -> Result<TokenPoll, OAuthError> {
        assert_eq!(device_code, "device-code-1");
        self.poll_calls.lock().unwrap().push(Instant::now());
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let next = self.polls.lock().unwrap().pop_front();
        next.unwrap_or(Ok(TokenPoll::Pending))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, OAuthError> {
        self.profile_calls
            .lock()
            .unwrap()
            .push(access_token.to_string());
        self.profile
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(profile()))
    }
}

pub fn device_response(interval: Option<u64>) -> DeviceAuthorizationResponse {
    DeviceAuthorizationResponse {
        device_code: Some("device-code-1".to_string()),
        user_code: Some("WDJB-MJHT".to_string()),
        verification_uri: Some("https://idp.example.com/activate".to_string()),
        verification_uri_complete: None,
        interval,
        expires_in: Some(600),
    }
}

pub fn token() -> TokenResponse {
    TokenResponse {
        access_token: "access-token-1".to_string(),
        refresh_token: None,
        token_type: Some("Bearer".to_string()),
        scope: Some("openid profile email".to_string()),
        expires_in: Some(3600),
        id_token: None,
        extra: HashMap::new(),
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        sub: Some("00u1abcd".to_string()),
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        given_name: Some("Ada".to_string()),
        family_name: Some("Lovelace".to_string()),
        email_verified: Some(true),
        extra: HashMap::new(),
    }
}

/// A real transport failure: nothing listens on port 1.
pub async fn connection_refused() -> OAuthError {
    let err = reqwest::Client::new()
        .post("http://127.0.0.1:1/v1/device/authorize")
        .send()
        .await
        .expect_err("nothing listens on port 1");
    OAuthError::Http(err)
}
