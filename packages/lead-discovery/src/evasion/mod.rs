//! Evasion layer: outbound requests through rotating identities.
//!
//! Every scraped source and every enrichment fetch goes through
//! [`EvasionLayer::request`]. It keeps one session (proxy + user agent) per
//! host, retries block signals and network failures under a [`RetryPolicy`],
//! and rotates to a different identity before each retry.
//!
//! Two maintenance operations run on the cron scheduler:
//! [`EvasionLayer::health_check`] and [`EvasionLayer::cleanup_idle_sessions`].

pub mod proxy;
pub mod retry;
pub mod session;
pub mod transport;

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::error::EvasionError;

pub use proxy::{HealthPolicy, ProxyHealth, ProxyPool, ProxyRecord, ProxyStatus};
pub use retry::{classify, FailureKind, ResponseClass, RetryPolicy};
pub use session::{Session, SessionTable};
pub use transport::{
    Method, OutboundRequest, ProxyCredentials, ProxyEndpoint, RawResponse, ReqwestTransport,
    Transport,
};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(20),
        }
    }
}

impl RequestOptions {
    pub fn post_json(body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A successful response and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Attempts it took, including the successful one
    pub attempts: u32,
    /// Proxy that served it; None for a direct connection
    pub proxy_id: Option<usize>,
}

/// Outcome of one health-check pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub quarantined: Vec<usize>,
    pub restored: Vec<usize>,
    pub healthy: usize,
    pub total: usize,
}

pub struct EvasionLayer {
    transport: Arc<dyn Transport>,
    pool: ProxyPool,
    sessions: SessionTable,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    limiter: Option<DefaultRateLimiter>,
    user_agents: Vec<String>,
    ua_cursor: AtomicUsize,
    closed: AtomicBool,
}

impl EvasionLayer {
    pub fn new(transport: Arc<dyn Transport>, pool: ProxyPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            pool,
            sessions: SessionTable::new(chrono::Duration::minutes(10)),
            policy: RetryPolicy::default(),
            clock,
            limiter: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            ua_cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        self.sessions = SessionTable::new(ttl);
        self
    }

    /// Cap outbound requests across all hosts. Zero disables the limit.
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        self
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        if !user_agents.is_empty() {
            self.user_agents = user_agents;
        }
        self
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fetch `url`, retrying blocks and network failures on fresh identities.
    pub async fn request(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, EvasionError> {
        if self.is_closed() {
            return Err(EvasionError::Closed);
        }
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| EvasionError::InvalidUrl {
                url: url.to_string(),
            })?;

        let mut session = self
            .sessions
            .get_or_create(&host, || self.new_session(None));
        if let Some(id) = session.proxy_id {
            if !matches!(self.pool.endpoint(id), Some((_, ProxyHealth::Healthy))) {
                session = self.rotate(&host, Some(id));
            }
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let outbound = OutboundRequest {
                url: url.to_string(),
                method: options.method,
                headers: options.headers.clone(),
                body: options.body.clone(),
                proxy: session
                    .proxy_id
                    .and_then(|id| self.pool.endpoint(id))
                    .map(|(endpoint, _)| endpoint),
                user_agent: session.user_agent.clone(),
                timeout: options.timeout,
            };

            let failure = match self.transport.send(&outbound).await {
                Ok(response) => match classify(response.status, &response.body) {
                    ResponseClass::Success => {
                        self.record(&session, true);
                        self.sessions.touch(&host, self.clock.now());
                        if attempt > 1 {
                            debug!(url = %url, attempts = attempt, "Request succeeded after retry");
                        }
                        return Ok(FetchResponse {
                            url: url.to_string(),
                            status: response.status,
                            body: response.body,
                            attempts: attempt,
                            proxy_id: session.proxy_id,
                        });
                    }
                    ResponseClass::Reject => {
                        // The identity worked; the resource is the problem.
                        self.record(&session, true);
                        self.sessions.touch(&host, self.clock.now());
                        return Err(EvasionError::Rejected {
                            url: url.to_string(),
                            status: response.status,
                        });
                    }
                    ResponseClass::Retry(kind) => kind,
                },
                Err(e) => match retry::classify_transport(&e) {
                    Some(kind) => kind,
                    None => return Err(EvasionError::Transport(e)),
                },
            };

            self.record(&session, false);

            if !self.policy.should_retry(attempt, failure) {
                warn!(
                    url = %url,
                    attempts = attempt,
                    failure = %failure,
                    "Giving up on request"
                );
                return Err(EvasionError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.delay_for(attempt, failure);
            debug!(
                url = %url,
                attempt = attempt,
                failure = %failure,
                delay_ms = delay.as_millis() as u64,
                "Rotating identity and retrying"
            );
            session = self.rotate(&host, session.proxy_id);
            self.clock.sleep(delay).await;
        }
    }

    /// Quarantine failing proxies and re-admit recovered ones.
    pub async fn health_check(&self) -> HealthReport {
        let now = self.clock.now();

        let quarantined = self.pool.quarantine_failing(now);
        for id in &quarantined {
            let dropped = self.sessions.drop_for_proxy(*id);
            warn!(proxy_id = id, sessions_dropped = dropped, "Proxy quarantined");
        }

        let mut restored = Vec::new();
        for (id, endpoint) in self.pool.due_for_restore(now) {
            let healthy = match &self.pool.policy().probe_url {
                Some(probe_url) => self.probe(probe_url, endpoint).await,
                None => true,
            };
            if healthy {
                self.pool.restore(id);
                info!(proxy_id = id, "Proxy restored to rotation");
                restored.push(id);
            } else {
                self.pool.extend_quarantine(id, now);
                debug!(proxy_id = id, "Proxy probe failed, staying quarantined");
            }
        }

        let report = HealthReport {
            quarantined,
            restored,
            healthy: self.pool.healthy_count(),
            total: self.pool.len(),
        };
        if report.total > 0 && report.healthy == 0 {
            warn!("No healthy proxies left; requests will go out directly");
        }
        report
    }

    /// Evict session affinity entries idle past the TTL.
    pub fn cleanup_idle_sessions(&self) -> usize {
        let removed = self.sessions.cleanup_idle(self.clock.now());
        if removed > 0 {
            debug!(removed = removed, "Cleaned up idle sessions");
        }
        removed
    }

    /// Stop accepting requests and release sessions and connections.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let sessions = self.sessions.len();
        self.sessions.clear();
        self.transport.close().await;
        info!(sessions_drained = sessions, "Evasion layer closed");
    }

    async fn probe(&self, url: &str, endpoint: ProxyEndpoint) -> bool {
        let request = OutboundRequest {
            url: url.to_string(),
            method: Method::Get,
            headers: BTreeMap::new(),
            body: None,
            proxy: Some(endpoint),
            user_agent: self.next_user_agent(),
            timeout: PROBE_TIMEOUT,
        };
        match self.transport.send(&request).await {
            Ok(response) => classify(response.status, &response.body) == ResponseClass::Success,
            Err(_) => false,
        }
    }

    fn record(&self, session: &Session, success: bool) {
        if let Some(id) = session.proxy_id {
            self.pool.record_outcome(id, success, self.clock.now());
        }
    }

    fn rotate(&self, host: &str, previous: Option<usize>) -> Session {
        let session = self.new_session(previous);
        self.sessions.replace(host, session.clone());
        session
    }

    fn new_session(&self, exclude: Option<usize>) -> Session {
        let proxy_id = match self.pool.select(exclude) {
            Some((id, _)) => Some(id),
            None => {
                if !self.pool.is_empty() {
                    warn!("No healthy proxy available, using direct connection");
                }
                None
            }
        };
        let now = self.clock.now();
        Session {
            proxy_id,
            user_agent: self.next_user_agent(),
            created_at: now,
            last_used_at: now,
            requests: 0,
        }
    }

    fn next_user_agent(&self) -> String {
        let index = self.ua_cursor.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        self.user_agents[index].clone()
    }
}
