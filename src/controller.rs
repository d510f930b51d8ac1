//! The device flow state machine.
//!
//! `initializing -> qr_display -> polling -> {authenticated | error}`, with
//! `reset`/`logout` as the only way back to `initializing`. Each cycle is
//! tagged with a generation number; every asynchronous step re-checks it
//! under the lock before touching the session, so a reset can never be
//! overwritten by a tick or response that belonged to the previous cycle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::retry::AuthorizeRetry;
use crate::session::{AuthSession, AuthState, DeviceCodes};
use crate::{FlowError, OAuthError, OAuthProviderClient, PollPolicy, TokenPoll};

const TRANSITION_CAPACITY: usize = 16;

#[derive(Debug)]
struct Cycle {
    session: AuthSession,
    generation: u64,
    cancel: CancellationToken,
    running: bool,
}

/// Bounded count of token requests made by one poll loop.
#[derive(Debug)]
struct PollAttemptCounter {
    made: u32,
    max: u32,
}

impl PollAttemptCounter {
    fn new(max: u32) -> Self {
        Self { made: 0, max }
    }

    fn record(&mut self) -> u32 {
        self.made += 1;
        self.made
    }

    fn exhausted(&self) -> bool {
        self.made >= self.max
    }
}

pub struct AuthFlowController<P> {
    provider: P,
    policy: PollPolicy,
    cycle: Mutex<Cycle>,
    snapshot: watch::Sender<AuthSession>,
    transitions: broadcast::Sender<AuthState>,
}

impl<P: OAuthProviderClient> AuthFlowController<P> {
    pub fn new(provider: P) -> Self {
        Self::with_policy(provider, PollPolicy::default())
    }

    pub fn with_policy(provider: P, policy: PollPolicy) -> Self {
        let (snapshot, _) = watch::channel(AuthSession::default());
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            provider,
            policy,
            cycle: Mutex::new(Cycle {
                session: AuthSession::default(),
                generation: 0,
                cancel: CancellationToken::new(),
                running: false,
            }),
            snapshot,
            transitions,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> AuthSession {
        self.lock().session.clone()
    }

    /// Latest session, re-published after every change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.snapshot.subscribe()
    }

    /// Every state change in order, including ones a `watch` reader would
    /// coalesce (`qr_display` is immediately followed by `polling`).
    pub fn transitions(&self) -> broadcast::Receiver<AuthState> {
        self.transitions.subscribe()
    }

    /// Runs one device flow cycle until it reaches a terminal state or is
    /// reset, returning the session at that point. Does nothing unless the
    /// controller is in `initializing` with no cycle already running.
    pub async fn start(&self) -> AuthSession {
        let Some((generation, cancel)) = self.begin() else {
            debug!("start ignored, flow already in progress");
            return self.snapshot();
        };

        info!(generation, "starting device authorization");
        let retry = AuthorizeRetry::from_policy(&self.policy);
        let authorized = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.snapshot(),
            result = retry.execute(|| self.provider.device_authorize()) => result,
        };

        let codes = authorized.and_then(|response| {
            let response = response.validate()?;
            let codes = DeviceCodes::from_response(&response).ok_or(
                OAuthError::MalformedResponse {
                    missing: response.missing_fields(),
                },
            )?;
            Ok((codes, response.interval, response.expires_in))
        });

        let (codes, server_interval, expires_in) = match codes {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "device authorization failed");
                self.fail(generation, FlowError::Authorize(err));
                return self.snapshot();
            }
        };

        let interval = self.policy.interval(server_interval);
        let device_code = codes.device_code.clone();
        let applied = self.apply(generation, |session| {
            session.codes = Some(codes);
            session.poll_interval = Some(interval);
            session.expires_in = expires_in;
            session.state = AuthState::QrDisplay;
        });
        if !applied {
            return self.snapshot();
        }

        self.poll(generation, &cancel, &device_code, interval).await;
        self.snapshot()
    }

    /// Runs [`start`](Self::start) on its own task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<AuthSession>
    where
        P: 'static,
    {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.start().await })
    }

    /// Cancels any running cycle and clears the session back to
    /// `initializing`. Safe to call in any state, any number of times.
    pub fn reset(&self) {
        let mut cycle = self.lock();
        cycle.cancel.cancel();
        cycle.cancel = CancellationToken::new();
        cycle.generation += 1;
        cycle.running = false;
        let previous = cycle.session.state;
        cycle.session.clear();
        info!(generation = cycle.generation, from = %previous, "session reset");
        self.publish(&cycle.session, previous);
    }

    pub fn logout(&self) {
        self.reset();
    }

    /// Resets and immediately starts a fresh cycle.
    pub async fn retry(&self) -> AuthSession {
        self.reset();
        self.start().await
    }

    /// Fetches the profile for an access token and records it on the
    /// session. Only applies while `authenticated`; a failure is recorded as
    /// the error reason without leaving `authenticated`.
    pub async fn fetch_profile(&self, access_token: &str) -> AuthSession {
        let (generation, cancel) = {
            let cycle = self.lock();
            if cycle.session.state != AuthState::Authenticated {
                return cycle.session.clone();
            }
            (cycle.generation, cycle.cancel.clone())
        };
        self.load_profile(generation, &cancel, access_token).await;
        self.snapshot()
    }

    async fn poll(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        device_code: &str,
        interval: Duration,
    ) {
        if !self.apply(generation, |session| session.state = AuthState::Polling) {
            return;
        }

        let started = Instant::now();
        let ceiling = tokio::time::sleep(self.policy.max_poll_duration);
        tokio::pin!(ceiling);
        let mut cadence = interval_at(started + interval, interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = PollAttemptCounter::new(self.policy.max_poll_attempts);

        info!(
            interval_secs = interval.as_secs(),
            max_attempts = attempts.max,
            "polling for token"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = &mut ceiling => {
                    warn!(elapsed_secs = started.elapsed().as_secs(), "poll ceiling reached");
                    self.fail(generation, FlowError::Timeout);
                    return;
                }
                _ = cadence.tick() => {}
            }

            let attempt = attempts.record();
            debug!(attempt, max_attempts = attempts.max, "polling token endpoint");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = &mut ceiling => {
                    warn!(elapsed_secs = started.elapsed().as_secs(), "poll ceiling reached");
                    self.fail(generation, FlowError::Timeout);
                    return;
                }
                outcome = self.provider.poll_token(device_code) => outcome,
            };

            match outcome {
                Ok(TokenPoll::Granted(token)) => {
                    info!(attempt, "device authorized");
                    if self.apply(generation, |session| {
                        session.state = AuthState::Authenticated;
                    }) {
                        self.load_profile(generation, cancel, &token.access_token)
                            .await;
                    }
                    return;
                }
                Ok(TokenPoll::Pending) => debug!(attempt, "authorization pending"),
                Ok(TokenPoll::Expired) => {
                    info!(attempt, "device code expired");
                    self.fail(generation, FlowError::ExpiredToken);
                    return;
                }
                Ok(TokenPoll::Rejected { error, description }) => {
                    warn!(attempt, %error, ?description, "token error, continuing");
                }
                Ok(TokenPoll::RateLimited) => warn!(attempt, "token endpoint rate limited"),
                Ok(TokenPoll::UnexpectedStatus(status)) => {
                    warn!(attempt, status, "unexpected token response, continuing");
                }
                Err(err) => warn!(attempt, error = %err, "token poll failed, continuing"),
            }

            if attempts.exhausted() {
                warn!(attempts = attempts.made, "poll attempts exhausted");
                self.fail(generation, FlowError::Timeout);
                return;
            }
        }
    }

    async fn load_profile(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        access_token: &str,
    ) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.provider.fetch_profile(access_token) => result,
        };

        match result {
            Ok(profile) => {
                self.apply(generation, |session| {
                    session.user_profile = Some(profile);
                    session.error_reason = None;
                });
            }
            Err(err) => {
                warn!(error = %err, "profile fetch failed");
                let reason = FlowError::ProfileFetch(err).to_string();
                self.apply(generation, |session| session.error_reason = Some(reason));
            }
        }
    }

    fn begin(&self) -> Option<(u64, CancellationToken)> {
        let mut cycle = self.lock();
        if cycle.running || cycle.session.state != AuthState::Initializing {
            return None;
        }
        cycle.running = true;
        Some((cycle.generation, cycle.cancel.clone()))
    }

    fn fail(&self, generation: u64, error: FlowError) {
        let reason = error.to_string();
        self.apply(generation, |session| session.fail(reason));
    }

    /// Applies `change` if `generation` is still current. Returns whether it did.
    fn apply<F>(&self, generation: u64, change: F) -> bool
    where
        F: FnOnce(&mut AuthSession),
    {
        let mut cycle = self.lock();
        if cycle.generation != generation {
            debug!(generation, current = cycle.generation, "dropping stale update");
            return false;
        }
        let previous = cycle.session.state;
        change(&mut cycle.session);
        if cycle.session.state != previous {
            info!(from = %previous, to = %cycle.session.state, "state transition");
        }
        self.publish(&cycle.session, previous);
        true
    }

    fn publish(&self, session: &AuthSession, previous: AuthState) {
        self.snapshot.send_replace(session.clone());
        if session.state != previous {
            let _ = self.transitions.send(session.state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
