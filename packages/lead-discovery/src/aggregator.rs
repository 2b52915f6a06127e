//! The discovery run: fan out to sources, merge, enrich, extract, score, save.
//!
//! A run walks its job through a fixed stage sequence:
//!
//! | Stage        | Percent | Work                                          |
//! |--------------|---------|-----------------------------------------------|
//! | `scraping`   | 5-55    | bounded fan-out over the enabled sources      |
//! | `enriching`  | 60-70   | page text for candidates with short snippets  |
//! | `extracting` | 72-90   | field heuristics and confidence scoring       |
//! | `saving`     | 90-99   | batched hand-off to the sink                  |
//! | `completed`  | 100     | summary recorded                              |
//!
//! A failing source is logged and dropped. A failing sink ends the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::extractor;
use crate::registry::JobRegistry;
use crate::sources::{ContentFetcher, LeadSource, SourceQuery, SourceResult};
use crate::traits::LeadSink;
use crate::types::{CandidateResult, Configuration, JobStage, Lead, RunSummary, StageUpdate};
use crate::verifier::Verifier;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    /// Source queries in flight at once
    pub fan_out: usize,
    pub source_timeout: Duration,
    /// Snippets shorter than this (in chars) get the full page fetched
    pub enrich_threshold: usize,
    pub enrich_concurrency: usize,
    pub save_batch_size: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            fan_out: 4,
            source_timeout: Duration::from_secs(45),
            enrich_threshold: 160,
            enrich_concurrency: 3,
            save_batch_size: 25,
        }
    }
}

pub struct SourceAggregator {
    sources: Vec<Arc<dyn LeadSource>>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    verifier: Verifier,
    sink: Arc<dyn LeadSink>,
    registry: Arc<JobRegistry>,
    settings: AggregatorSettings,
}

impl SourceAggregator {
    pub fn new(sink: Arc<dyn LeadSink>, registry: Arc<JobRegistry>) -> Self {
        Self {
            sources: Vec::new(),
            fetcher: None,
            verifier: Verifier::new(),
            sink,
            registry,
            settings: AggregatorSettings::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn LeadSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn LeadSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_settings(mut self, settings: AggregatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Run one discovery for `config` under an already-created job.
    pub async fn run(
        &self,
        config: &Configuration,
        job_id: &str,
    ) -> Result<RunSummary, PipelineError> {
        let query = SourceQuery::from_configuration(config);
        let planned = self.plan(config);
        let mut summary = RunSummary {
            sources_planned: planned.len(),
            ..RunSummary::default()
        };

        info!(
            job_id = %job_id,
            config_id = %config.id,
            sources = planned.len(),
            keywords = ?query.keywords,
            "Starting discovery run"
        );

        // Scraping
        let candidates = self.query_sources(job_id, planned, &query, &mut summary).await;
        summary.candidates_found = candidates.len();
        let mut candidates = dedup_by_url(candidates);
        summary.duplicates_removed = summary.candidates_found - candidates.len();
        candidates.truncate(config.max_results);

        // Enriching
        let candidates = self.enrich(job_id, candidates, &mut summary).await;

        // Extracting
        let leads = self.extract(job_id, candidates, &mut summary);
        summary.leads_generated = leads.len();

        // Saving
        if let Err(e) = self.save(job_id, config, &leads, &mut summary).await {
            let message = format!("Saving leads failed: {}", e);
            error!(job_id = %job_id, error = %e, "Discovery run failed");
            if let Err(reg) = self.registry.fail(job_id, message) {
                warn!(job_id = %job_id, error = %reg, "Could not mark job as failed");
            }
            return Err(PipelineError::Sink(e));
        }

        if let Err(e) = self.registry.complete(job_id, summary.clone()) {
            warn!(job_id = %job_id, error = %e, "Could not mark job as completed");
        }
        info!(
            job_id = %job_id,
            saved = summary.saved_leads,
            generated = summary.leads_generated,
            failed_sources = summary.sources_failed,
            "Discovery run complete"
        );
        Ok(summary)
    }

    /// Registered sources for the enabled kinds, API group first, config order within a group.
    fn plan(&self, config: &Configuration) -> Vec<Arc<dyn LeadSource>> {
        let mut planned: Vec<Arc<dyn LeadSource>> = Vec::new();
        for kind in config.enabled_sources() {
            match self.sources.iter().find(|s| s.kind() == kind) {
                Some(source) => planned.push(source.clone()),
                None => warn!(source = %kind, "No source registered for enabled kind, skipping"),
            }
        }
        planned.sort_by_key(|s| s.kind().group());
        planned
    }

    async fn query_sources(
        &self,
        job_id: &str,
        planned: Vec<Arc<dyn LeadSource>>,
        query: &SourceQuery,
        summary: &mut RunSummary,
    ) -> Vec<CandidateResult> {
        let total = planned.len();
        self.progress(
            job_id,
            StageUpdate::new(
                JobStage::Scraping,
                5,
                format!("Searching {} sources", total),
            )
            .with_counts(0, total),
        );

        let timeout = self.settings.source_timeout;
        let searches: Vec<_> = planned
            .into_iter()
            .enumerate()
            .map(|(priority, source)| {
                let query = query.clone();
                async move {
                    let kind = source.kind();
                    let outcome = tokio::time::timeout(timeout, source.search(&query)).await;
                    (priority, kind, outcome)
                }
                .boxed()
            })
            .collect();
        let mut results = stream::iter(searches).buffer_unordered(self.settings.fan_out.max(1));

        let mut by_priority: Vec<(usize, Vec<CandidateResult>)> = Vec::with_capacity(total);
        let mut done = 0;
        while let Some((priority, kind, outcome)) = results.next().await {
            done += 1;
            match outcome {
                Ok(Ok(raw)) => {
                    summary.sources_succeeded += 1;
                    let found: Vec<CandidateResult> = raw
                        .into_iter()
                        .filter_map(SourceResult::into_candidate)
                        .collect();
                    debug!(job_id = %job_id, source = %kind, results = found.len(), "Source returned");
                    by_priority.push((priority, found));
                }
                Ok(Err(e)) => {
                    summary.sources_failed += 1;
                    warn!(job_id = %job_id, source = %kind, error = %e, "Source failed, excluding from run");
                }
                Err(_) => {
                    summary.sources_failed += 1;
                    warn!(
                        job_id = %job_id,
                        source = %kind,
                        timeout_secs = timeout.as_secs(),
                        "Source timed out, excluding from run"
                    );
                }
            }

            let percentage = 5 + (50 * done / total) as u8;
            self.progress(
                job_id,
                StageUpdate::new(
                    JobStage::Scraping,
                    percentage,
                    format!("Searched {} ({}/{} sources)", kind, done, total),
                )
                .with_counts(done, total),
            );
        }

        by_priority.sort_by_key(|(priority, _)| *priority);
        by_priority.into_iter().flat_map(|(_, found)| found).collect()
    }

    async fn enrich(
        &self,
        job_id: &str,
        candidates: Vec<CandidateResult>,
        summary: &mut RunSummary,
    ) -> Vec<CandidateResult> {
        let threshold = self.settings.enrich_threshold;
        let needing = candidates
            .iter()
            .filter(|c| c.snippet.chars().count() < threshold)
            .count();
        self.progress(
            job_id,
            StageUpdate::new(
                JobStage::Enriching,
                60,
                format!("Fetching full content for {} candidates", needing),
            )
            .with_counts(0, needing),
        );

        let Some(fetcher) = self.fetcher.clone() else {
            return candidates;
        };
        if needing == 0 {
            return candidates;
        }

        let fetches: Vec<_> = candidates
            .into_iter()
            .map(|mut candidate| {
                let fetcher = fetcher.clone();
                async move {
                    if candidate.snippet.chars().count() >= threshold {
                        return (candidate, None);
                    }
                    let fetched = match fetcher.fetch_text(&candidate.url).await {
                        Ok(text) if !text.trim().is_empty() => {
                            candidate.content = Some(text);
                            Some(true)
                        }
                        Ok(_) => Some(false),
                        Err(e) => {
                            debug!(url = %candidate.url, error = %e, "Enrichment failed, keeping snippet");
                            Some(false)
                        }
                    };
                    (candidate, fetched)
                }
                .boxed()
            })
            .collect();
        let mut enriched = stream::iter(fetches).buffered(self.settings.enrich_concurrency.max(1));

        let mut out = Vec::new();
        let mut attempted = 0;
        while let Some((candidate, fetched)) = enriched.next().await {
            if let Some(ok) = fetched {
                attempted += 1;
                if ok {
                    summary.candidates_enriched += 1;
                }
                let percentage = 60 + (10 * attempted / needing) as u8;
                self.progress(
                    job_id,
                    StageUpdate::new(
                        JobStage::Enriching,
                        percentage,
                        format!("Enriched {}/{} candidates", attempted, needing),
                    )
                    .with_counts(attempted, needing),
                );
            }
            out.push(candidate);
        }
        out
    }

    fn extract(
        &self,
        job_id: &str,
        candidates: Vec<CandidateResult>,
        summary: &mut RunSummary,
    ) -> Vec<Lead> {
        let total = candidates.len();
        self.progress(
            job_id,
            StageUpdate::new(
                JobStage::Extracting,
                72,
                format!("Extracting fields from {} candidates", total),
            )
            .with_counts(0, total),
        );

        let mut leads = Vec::with_capacity(total);
        for (index, candidate) in candidates.into_iter().enumerate() {
            let verification = self.verifier.verify(extractor::extract(candidate));
            if verification.is_degraded() {
                summary.verification_failures += 1;
            }
            leads.push(verification.lead);

            let done = index + 1;
            self.progress(
                job_id,
                StageUpdate::new(
                    JobStage::Extracting,
                    72 + (18 * done / total) as u8,
                    format!("Extracted {}/{} leads", done, total),
                )
                .with_counts(done, total),
            );
        }
        leads
    }

    async fn save(
        &self,
        job_id: &str,
        config: &Configuration,
        leads: &[Lead],
        summary: &mut RunSummary,
    ) -> Result<(), crate::error::SinkError> {
        let total = leads.len();
        self.progress(
            job_id,
            StageUpdate::new(JobStage::Saving, 90, format!("Saving {} leads", total))
                .with_counts(0, total),
        );

        let batch_size = self.settings.save_batch_size.max(1);
        let mut handed_off = 0;
        for batch in leads.chunks(batch_size) {
            let saved = self.sink.save_leads(config.owner_id, batch).await?;
            summary.saved_leads += saved;
            handed_off += batch.len();

            self.progress(
                job_id,
                StageUpdate::new(
                    JobStage::Saving,
                    90 + (9 * handed_off / total) as u8,
                    format!("Saved {}/{} leads", handed_off, total),
                )
                .with_counts(handed_off, total),
            );
        }
        Ok(())
    }

    fn progress(&self, job_id: &str, update: StageUpdate) {
        if let Err(e) = self.registry.update(job_id, update) {
            warn!(job_id = %job_id, error = %e, "Progress update rejected");
        }
    }
}

/// Keep the first candidate per exact URL, after a stable sort by source
/// priority group (API, then web search, then industry sites).
pub fn dedup_by_url(mut candidates: Vec<CandidateResult>) -> Vec<CandidateResult> {
    candidates.sort_by_key(|c| c.source.group());
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.url.trim().to_string()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    fn candidate(source: SourceKind, url: &str) -> CandidateResult {
        CandidateResult::new(source, format!("from {}", source), url)
    }

    #[test]
    fn test_dedup_keeps_api_over_scraped() {
        let input = vec![
            candidate(SourceKind::HotelNews, "https://a.com/1"),
            candidate(SourceKind::WebSearch, "https://a.com/1"),
            candidate(SourceKind::Tavily, "https://a.com/1"),
            candidate(SourceKind::WebSearch, "https://b.com/2"),
        ];
        let out = dedup_by_url(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, SourceKind::Tavily);
        assert_eq!(out[0].url, "https://a.com/1");
        assert_eq!(out[1].url, "https://b.com/2");
    }

    #[test]
    fn test_dedup_first_wins_within_group() {
        let out = dedup_by_url(vec![
            candidate(SourceKind::NewsApi, "https://a.com/1"),
            candidate(SourceKind::Tavily, "https://a.com/1"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, SourceKind::NewsApi);
    }

    #[test]
    fn test_dedup_is_exact_match() {
        let out = dedup_by_url(vec![
            candidate(SourceKind::Tavily, "https://a.com/1"),
            candidate(SourceKind::Tavily, "https://a.com/1/"),
        ]);
        assert_eq!(out.len(), 2);
    }
}
