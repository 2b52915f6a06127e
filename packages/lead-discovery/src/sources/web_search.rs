//! General web search, scraped from DuckDuckGo's HTML endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{squash_whitespace, LeadSource, SourceQuery, SourceResult};
use crate::error::SourceError;
use crate::evasion::{EvasionLayer, RequestOptions};
use crate::types::{CandidateResult, SourceKind};

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance: f32,
}

pub struct WebSearchSource {
    evasion: Arc<EvasionLayer>,
    endpoint: String,
}

impl WebSearchSource {
    pub fn new(evasion: Arc<EvasionLayer>) -> Self {
        Self {
            evasion,
            endpoint: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn search_url(&self, query: &SourceQuery) -> Result<String, SourceError> {
        Url::parse_with_params(&self.endpoint, &[("q", query.joined())])
            .map(String::from)
            .map_err(|e| SourceError::Malformed(format!("search endpoint: {}", e)))
    }
}

#[async_trait]
impl LeadSource for WebSearchSource {
    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError> {
        let url = self.search_url(query)?;
        let response = self.evasion.request(&url, &RequestOptions::default()).await?;

        let hits = parse_results(&response.body, query)?;
        debug!(
            query = %query.joined(),
            results = hits.len(),
            attempts = response.attempts,
            "Web search complete"
        );
        Ok(hits
            .into_iter()
            .take(query.max_results)
            .map(SourceResult::WebSearch)
            .collect())
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Malformed(format!("selector {}: {}", css, e)))
}

/// Parse a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, query: &SourceQuery) -> Result<Vec<SearchHit>, SourceError> {
    let result_sel = selector(".result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let document = Html::parse_document(html);
    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(resolve_result_link) else {
            continue;
        };
        let title = squash_whitespace(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| squash_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();
        let relevance = query.relevance_of(&format!("{} {}", title, snippet));

        hits.push(SearchHit {
            title,
            url,
            snippet,
            relevance,
        });
    }
    Ok(hits)
}

/// Unwrap DuckDuckGo's `/l/?uddg=<target>` redirect links. Ads and non-http links are dropped.
fn resolve_result_link(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let url = base.join(href).ok()?;

    let target = if url.path().starts_with("/l/") {
        let (_, target) = url.query_pairs().find(|(k, _)| k == "uddg")?;
        Url::parse(&target).ok()?
    } else {
        url
    };

    let is_ad = target
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"));
    if is_ad || !matches!(target.scheme(), "http" | "https") {
        return None;
    }
    Some(target.to_string())
}

pub(crate) fn to_candidate(hit: SearchHit) -> Option<CandidateResult> {
    Some(
        CandidateResult::new(SourceKind::WebSearch, hit.title, hit.url)
            .with_snippet(hit.snippet)
            .with_relevance(hit.relevance),
    )
}
