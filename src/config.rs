use std::time::Duration;

const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DeviceFlowConfig {
    pub issuer: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Callback target registered with the provider. Informational only; the
    /// device flow never redirects.
    pub redirect_uri: Option<String>,
    pub timeout: Option<Duration>,
    pub policy: PollPolicy,
}

impl DeviceFlowConfig {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            redirect_uri: None,
            timeout: Some(DEFAULT_HTTP_TIMEOUT),
            policy: PollPolicy::default(),
        }
    }

    /// Replaces the requested scopes, dropping duplicates but keeping order.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            if !scope.is_empty() && !unique.contains(&scope) {
                unique.push(scope);
            }
        }
        self.scopes = unique;
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scopes as sent on the wire.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Timing bounds for the authorize retries and the token poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Used when the server omits `interval`.
    pub default_interval: Duration,
    pub max_poll_attempts: u32,
    /// Absolute ceiling on the poll loop, independent of interval and attempts.
    pub max_poll_duration: Duration,
    pub max_authorize_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(5),
            max_poll_attempts: 60,
            max_poll_duration: Duration::from_secs(300),
            max_authorize_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl PollPolicy {
    /// Resolves the server supplied interval, bounded below by one second and
    /// above by the poll ceiling.
    pub fn interval(&self, server_interval: Option<u64>) -> Duration {
        let floor = Duration::from_secs(1);
        let interval = server_interval
            .map(Duration::from_secs)
            .unwrap_or(self.default_interval);
        interval.clamp(floor, self.max_poll_duration.max(floor))
    }
}
