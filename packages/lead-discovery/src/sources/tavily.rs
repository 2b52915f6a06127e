//! Tavily search API source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_date, LeadSource, SourceQuery, SourceResult};
use crate::error::SourceError;
use crate::secret::SecretString;
use crate::types::{CandidateResult, SourceKind};

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Tavily refuses larger pages.
const MAX_RESULTS_PER_CALL: usize = 20;

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    topic: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TavilyHit {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub published_date: Option<String>,
}

pub struct TavilySource {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    search_depth: String,
    topic: String,
}

impl TavilySource {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: TAVILY_SEARCH_URL.to_string(),
            search_depth: "basic".to_string(),
            topic: "news".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// "basic" or "advanced".
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }
}

#[async_trait]
impl LeadSource for TavilySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Tavily
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError> {
        let text = query.joined();
        let request = TavilyRequest {
            query: &text,
            search_depth: &self.search_depth,
            topic: &self.topic,
            max_results: query.max_results.clamp(1, MAX_RESULTS_PER_CALL),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::Http(Box::new(e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Http(Box::new(e)))?;
        if !status.is_success() {
            return Err(SourceError::Api {
                provider: "tavily",
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let results = parse_response(&body)?;
        debug!(query = %text, results = results.len(), "Tavily search complete");
        Ok(results)
    }
}

pub fn parse_response(body: &str) -> Result<Vec<SourceResult>, SourceError> {
    let response: TavilyResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("tavily: {}", e)))?;
    Ok(response
        .results
        .into_iter()
        .map(SourceResult::Tavily)
        .collect())
}

pub(crate) fn to_candidate(hit: TavilyHit) -> Option<CandidateResult> {
    let published_at = hit.published_date.as_deref().and_then(parse_date);
    Some(
        CandidateResult::new(SourceKind::Tavily, hit.title.trim(), hit.url.trim())
            .with_snippet(hit.content.trim())
            .with_relevance(hit.score as f32)
            .with_published_at(published_at),
    )
}
