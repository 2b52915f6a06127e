//! External lead sources.
//!
//! Each source returns its own record shape wrapped in [`SourceResult`]; the
//! per-source adapter behind [`SourceResult::into_candidate`] normalizes it
//! into a [`CandidateResult`].
//!
//! - [`tavily::TavilySource`] and [`news_api::NewsApiSource`] are API-backed (verified)
//! - [`web_search::WebSearchSource`] scrapes general web search
//! - [`industry::IndustrySiteSource`] scrapes trade-news sites
//!
//! Scraped sources go through the [`crate::evasion::EvasionLayer`].

pub mod content;
pub mod industry;
pub mod news_api;
pub mod tavily;
pub mod web_search;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::SourceError;
use crate::types::{CandidateResult, Configuration, SourceKind};

pub use content::{ContentFetcher, EvasionContentFetcher};
pub use industry::{IndustryArticle, IndustrySiteSource, SiteProfile};
pub use news_api::{NewsApiSource, NewsArticle};
pub use tavily::{TavilyHit, TavilySource};
pub use web_search::{SearchHit, WebSearchSource};

/// What a source is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub keywords: Vec<String>,
    pub max_results: usize,
}

impl SourceQuery {
    pub fn new(keywords: Vec<String>, max_results: usize) -> Self {
        Self {
            keywords,
            max_results,
        }
    }

    pub fn from_configuration(config: &Configuration) -> Self {
        Self::new(config.search_keywords(), config.max_results)
    }

    /// Keywords joined with spaces, for free-text search boxes.
    pub fn joined(&self) -> String {
        self.keywords.join(" ")
    }

    /// Share of keywords that appear in `text`, case-insensitively.
    pub fn relevance_of(&self, text: &str) -> f32 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let lower = text.to_lowercase();
        let hits = self
            .keywords
            .iter()
            .filter(|k| lower.contains(&k.to_lowercase()))
            .count();
        hits as f32 / self.keywords.len() as f32
    }
}

#[async_trait]
pub trait LeadSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError>;
}

/// A raw record from one of the sources.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    Tavily(TavilyHit),
    NewsApi(NewsArticle),
    WebSearch(SearchHit),
    Industry(IndustryArticle),
}

impl SourceResult {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceResult::Tavily(_) => SourceKind::Tavily,
            SourceResult::NewsApi(_) => SourceKind::NewsApi,
            SourceResult::WebSearch(_) => SourceKind::WebSearch,
            SourceResult::Industry(article) => article.source,
        }
    }

    /// Normalize into a candidate. None for records without a usable title or URL.
    pub fn into_candidate(self) -> Option<CandidateResult> {
        let candidate = match self {
            SourceResult::Tavily(hit) => tavily::to_candidate(hit),
            SourceResult::NewsApi(article) => news_api::to_candidate(article),
            SourceResult::WebSearch(hit) => web_search::to_candidate(hit),
            SourceResult::Industry(article) => industry::to_candidate(article),
        }?;
        if candidate.title.trim().is_empty() || candidate.url.trim().is_empty() {
            return None;
        }
        Some(candidate)
    }
}

/// Parse the date formats the sources emit: RFC 3339, RFC 2822 or a bare date.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
        assert_eq!(parse_date("2024-03-14T09:30:00Z"), Some(expected));
        assert_eq!(parse_date("Thu, 14 Mar 2024 09:30:00 +0000"), Some(expected));
        assert_eq!(
            parse_date("2024-03-14"),
            Some(Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("last tuesday"), None);
    }

    #[test]
    fn test_relevance_is_keyword_share() {
        let query = SourceQuery::new(vec!["hotel".into(), "construction".into()], 10);
        assert_eq!(query.relevance_of("New HOTEL opens"), 0.5);
        assert_eq!(query.relevance_of("Hotel construction begins"), 1.0);
        assert_eq!(query.relevance_of("nothing"), 0.0);
    }

    #[test]
    fn test_into_candidate_drops_untitled() {
        let hit = SearchHit {
            title: "   ".into(),
            url: "https://example.com".into(),
            snippet: String::new(),
            relevance: 1.0,
        };
        assert!(SourceResult::WebSearch(hit).into_candidate().is_none());
    }
}
