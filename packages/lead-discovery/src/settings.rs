//! Pipeline configuration.
//!
//! Every knob has a default; the host overrides what it needs with the
//! `with_*` builders.

use std::time::Duration;

use crate::aggregator::AggregatorSettings;
use crate::evasion::{HealthPolicy, ProxyEndpoint, RetryPolicy};
use crate::registry::DEFAULT_GRACE_PERIOD;
use crate::secret::SecretString;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub aggregator: AggregatorSettings,
    /// How long finished jobs stay readable
    pub job_grace_period: Duration,
    pub retry: RetryPolicy,
    pub health: HealthPolicy,
    pub session_ttl: Duration,
    /// Outbound request cap across scraped sources; None for no cap
    pub requests_per_second: Option<u32>,
    pub proxies: Vec<ProxyEndpoint>,
    /// Enables the Tavily source
    pub tavily_api_key: Option<SecretString>,
    /// Enables the NewsAPI source
    pub news_api_key: Option<SecretString>,
    /// Register the scraped web search and industry sources
    pub scraped_sources: bool,
    /// Fetch full page text for short snippets
    pub enrichment: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            aggregator: AggregatorSettings::default(),
            job_grace_period: DEFAULT_GRACE_PERIOD,
            retry: RetryPolicy::default(),
            health: HealthPolicy::default(),
            session_ttl: Duration::from_secs(600),
            requests_per_second: Some(4),
            proxies: Vec::new(),
            tavily_api_key: None,
            news_api_key: None,
            scraped_sources: true,
            enrichment: true,
        }
    }
}

impl PipelineSettings {
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.aggregator.fan_out = fan_out.max(1);
        self
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorSettings) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_job_grace_period(mut self, grace: Duration) -> Self {
        self.job_grace_period = grace;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn with_requests_per_second(mut self, rps: Option<u32>) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_proxies(mut self, proxies: Vec<ProxyEndpoint>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_tavily_api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.tavily_api_key = Some(key.into()).filter(|k: &SecretString| !k.is_empty());
        self
    }

    pub fn with_news_api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.news_api_key = Some(key.into()).filter(|k: &SecretString| !k.is_empty());
        self
    }

    pub fn with_scraped_sources(mut self, enabled: bool) -> Self {
        self.scraped_sources = enabled;
        self
    }

    pub fn with_enrichment(mut self, enabled: bool) -> Self {
        self.enrichment = enabled;
        self
    }
}
