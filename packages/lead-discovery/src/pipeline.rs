//! Wiring for a complete discovery pipeline.
//!
//! [`DiscoveryPipeline::builder`] assembles the evasion layer, sources,
//! registry, aggregator and scheduler from [`PipelineSettings`] and the two
//! host collaborators. Tests swap in a mock transport, clock or sources.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::SourceAggregator;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SchedulerError};
use crate::evasion::{EvasionLayer, ProxyPool, ReqwestTransport, Transport};
use crate::maintenance;
use crate::registry::JobRegistry;
use crate::scheduler::{DiscoveryRunner, DiscoveryScheduler, RunTicket};
use crate::settings::PipelineSettings;
use crate::sources::{
    ContentFetcher, EvasionContentFetcher, IndustrySiteSource, LeadSource, NewsApiSource,
    SiteProfile, TavilySource, WebSearchSource,
};
use crate::traits::{ConfigurationProvider, LeadSink};
use crate::types::{Configuration, JobSnapshot, ProgressView};

pub struct DiscoveryPipelineBuilder {
    provider: Arc<dyn ConfigurationProvider>,
    sink: Arc<dyn LeadSink>,
    settings: PipelineSettings,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<Arc<dyn Transport>>,
    sources: Option<Vec<Arc<dyn LeadSource>>>,
    extra_sources: Vec<Arc<dyn LeadSource>>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
}

impl DiscoveryPipelineBuilder {
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the default sources entirely.
    pub fn sources(mut self, sources: Vec<Arc<dyn LeadSource>>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Register a source alongside the defaults.
    pub fn source(mut self, source: Arc<dyn LeadSource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub async fn build(self) -> std::result::Result<DiscoveryPipeline, SchedulerError> {
        let settings = self.settings;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

        let pool = ProxyPool::new(settings.proxies.clone(), settings.health.clone());
        let mut evasion = EvasionLayer::new(transport, pool, clock.clone())
            .with_policy(settings.retry.clone())
            .with_session_ttl(settings.session_ttl);
        if let Some(rps) = settings.requests_per_second {
            evasion = evasion.with_rate_limit(rps);
        }
        let evasion = Arc::new(evasion);

        let registry = Arc::new(JobRegistry::with_grace_period(
            clock.clone(),
            settings.job_grace_period,
        ));

        let mut sources = match self.sources {
            Some(sources) => sources,
            None => default_sources(&settings, &evasion),
        };
        sources.extend(self.extra_sources);

        let mut aggregator = SourceAggregator::new(self.sink.clone(), registry.clone())
            .with_sources(sources.iter().cloned())
            .with_settings(settings.aggregator.clone());
        let fetcher = match self.fetcher {
            Some(fetcher) => Some(fetcher),
            None if settings.enrichment => Some(
                Arc::new(EvasionContentFetcher::new(evasion.clone())) as Arc<dyn ContentFetcher>
            ),
            None => None,
        };
        if let Some(fetcher) = fetcher {
            aggregator = aggregator.with_fetcher(fetcher);
        }

        let runner = Arc::new(DiscoveryRunner::new(
            self.provider,
            self.sink,
            registry.clone(),
            Arc::new(aggregator),
            clock.clone(),
        ));
        let scheduler = DiscoveryScheduler::new(runner, clock).await?;

        info!(
            sources = ?sources.iter().map(|s| s.kind().name()).collect::<Vec<_>>(),
            proxies = settings.proxies.len(),
            "Discovery pipeline built"
        );

        Ok(DiscoveryPipeline {
            scheduler,
            registry,
            evasion,
        })
    }
}

fn default_sources(
    settings: &PipelineSettings,
    evasion: &Arc<EvasionLayer>,
) -> Vec<Arc<dyn LeadSource>> {
    let mut sources: Vec<Arc<dyn LeadSource>> = Vec::new();
    match &settings.tavily_api_key {
        Some(key) => sources.push(Arc::new(TavilySource::new(key.clone()))),
        None => warn!("TAVILY_API_KEY not set, Tavily source disabled"),
    }
    match &settings.news_api_key {
        Some(key) => sources.push(Arc::new(NewsApiSource::new(key.clone()))),
        None => warn!("NEWS_API_KEY not set, NewsAPI source disabled"),
    }
    if settings.scraped_sources {
        sources.push(Arc::new(WebSearchSource::new(evasion.clone())));
        sources.push(Arc::new(IndustrySiteSource::new(
            evasion.clone(),
            SiteProfile::hospitality_net(),
        )));
        sources.push(Arc::new(IndustrySiteSource::new(
            evasion.clone(),
            SiteProfile::construction_dive(),
        )));
    }
    sources
}

/// A running discovery pipeline.
pub struct DiscoveryPipeline {
    scheduler: DiscoveryScheduler,
    registry: Arc<JobRegistry>,
    evasion: Arc<EvasionLayer>,
}

impl DiscoveryPipeline {
    pub fn builder(
        provider: Arc<dyn ConfigurationProvider>,
        sink: Arc<dyn LeadSink>,
    ) -> DiscoveryPipelineBuilder {
        DiscoveryPipelineBuilder {
            provider,
            sink,
            settings: PipelineSettings::default(),
            clock: None,
            transport: None,
            sources: None,
            extra_sources: Vec::new(),
            fetcher: None,
        }
    }

    /// Register maintenance jobs and start firing timers.
    pub async fn start(&self) -> std::result::Result<(), SchedulerError> {
        maintenance::register_maintenance(
            self.scheduler.cron(),
            self.registry.clone(),
            self.evasion.clone(),
        )
        .await?;
        self.scheduler.start().await
    }

    pub async fn run_now(&self, config_id: Uuid) -> Result<RunTicket> {
        self.scheduler.run_now(config_id).await
    }

    pub fn progress(&self, job_id: &str) -> Option<ProgressView> {
        self.registry.progress(job_id)
    }

    pub fn job(&self, job_id: &str) -> Option<JobSnapshot> {
        self.registry.get(job_id)
    }

    pub fn jobs_for_user(&self, user_id: Uuid) -> Vec<JobSnapshot> {
        self.registry.list_by_user(user_id)
    }

    pub async fn schedule(&self, config: &Configuration) -> Result<Option<DateTime<Utc>>> {
        self.scheduler.schedule(config).await
    }

    pub async fn unschedule(&self, config_id: Uuid) -> Result<bool> {
        self.scheduler.unschedule(config_id).await
    }

    /// Schedule every configuration, logging and skipping the invalid ones.
    /// Returns how many got a timer.
    pub async fn schedule_all(&self, configs: impl IntoIterator<Item = Configuration>) -> usize {
        let mut scheduled = 0;
        for config in configs {
            match self.scheduler.schedule(&config).await {
                Ok(Some(_)) => scheduled += 1,
                Ok(None) => {}
                Err(e) => warn!(config_id = %config.id, error = %e, "Could not schedule configuration"),
            }
        }
        info!(scheduled = scheduled, "Configurations scheduled");
        scheduled
    }

    pub fn scheduler(&self) -> &DiscoveryScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn evasion(&self) -> &Arc<EvasionLayer> {
        &self.evasion
    }

    /// Stop the timers, then release sessions and connections.
    pub async fn shutdown(&self) -> std::result::Result<(), SchedulerError> {
        let stopped = self.scheduler.shutdown().await;
        self.evasion.close().await;
        stopped
    }
}
