use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::configuration::SourceKind;

/// A raw result from one source, before dedup and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: SourceKind,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    /// True for API-backed sources
    pub verified_source: bool,
    /// Relevance reported or derived by the source (0.0-1.0)
    pub relevance: f32,
    /// Page text fetched during enrichment
    pub content: Option<String>,
}

impl CandidateResult {
    pub fn new(source: SourceKind, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
            source,
            published_at: None,
            author: None,
            image_url: None,
            verified_source: source.is_verified(),
            relevance: 0.0,
            content: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = relevance.clamp(0.0, 1.0);
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Text the extractor runs over: title, snippet and any enriched content.
    pub fn text(&self) -> String {
        let mut text = self.title.clone();
        for part in [Some(self.snippet.as_str()), self.content.as_deref()]
            .into_iter()
            .flatten()
        {
            if !part.trim().is_empty() {
                text.push_str(". ");
                text.push_str(part.trim());
            }
        }
        text
    }
}
