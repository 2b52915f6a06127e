//! NewsAPI `/v2/everything` source.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{parse_date, LeadSource, SourceQuery, SourceResult};
use crate::error::SourceError;
use crate::secret::SecretString;
use crate::types::{CandidateResult, SourceKind};

pub const NEWS_API_EVERYTHING_URL: &str = "https://newsapi.org/v2/everything";

const MAX_PAGE_SIZE: usize = 100;

/// Title NewsAPI substitutes for articles pulled by the publisher.
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsArticle>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewsSourceRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    #[serde(default)]
    pub source: Option<NewsSourceRef>,
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
    /// Filled from the query, not the API
    #[serde(skip)]
    pub relevance: f32,
}

pub struct NewsApiSource {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    language: String,
}

impl NewsApiSource {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: NEWS_API_EVERYTHING_URL.to_string(),
            language: "en".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// NewsAPI query syntax: each keyword quoted, joined with OR.
fn build_query(query: &SourceQuery) -> String {
    query
        .keywords
        .iter()
        .map(|k| format!("\"{}\"", k.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl LeadSource for NewsApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::NewsApi
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError> {
        let q = build_query(query);
        let page_size = query.max_results.clamp(1, MAX_PAGE_SIZE).to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Api-Key", self.api_key.expose())
            .query(&[
                ("q", q.as_str()),
                ("language", self.language.as_str()),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http(Box::new(e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Http(Box::new(e)))?;

        let results = parse_response(status, &body, query)?;
        debug!(query = %q, results = results.len(), "NewsAPI search complete");
        Ok(results)
    }
}

/// NewsAPI reports errors as `{"status":"error"}` bodies, sometimes with a 200.
pub fn parse_response(
    status: u16,
    body: &str,
    query: &SourceQuery,
) -> Result<Vec<SourceResult>, SourceError> {
    let response: NewsApiResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) if (200..300).contains(&status) => {
            return Err(SourceError::Malformed(format!("news_api: {}", e)));
        }
        Err(_) => {
            return Err(SourceError::Api {
                provider: "news_api",
                status,
                message: body.chars().take(200).collect(),
            });
        }
    };

    if response.status != "ok" {
        let message = match (response.code, response.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (_, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "unknown error".to_string(),
        };
        return Err(SourceError::Api {
            provider: "news_api",
            status,
            message,
        });
    }

    Ok(response
        .articles
        .into_iter()
        .map(|mut article| {
            let text = format!(
                "{} {}",
                article.title.as_deref().unwrap_or_default(),
                article.description.as_deref().unwrap_or_default()
            );
            article.relevance = query.relevance_of(&text);
            SourceResult::NewsApi(article)
        })
        .collect())
}

pub(crate) fn to_candidate(article: NewsArticle) -> Option<CandidateResult> {
    let title = article.title.as_deref()?.trim();
    if title == REMOVED_MARKER {
        return None;
    }
    let published_at = article.published_at.as_deref().and_then(parse_date);
    Some(
        CandidateResult::new(SourceKind::NewsApi, title, article.url.trim())
            .with_snippet(article.description.unwrap_or_default().trim())
            .with_relevance(article.relevance)
            .with_published_at(published_at)
            .with_author(article.author)
            .with_image_url(article.url_to_image),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> SourceQuery {
        SourceQuery::new(vec!["hotel".into(), "construction".into()], 20)
    }

    #[test]
    fn test_build_query_quotes_keywords() {
        assert_eq!(build_query(&query()), r#""hotel" OR "construction""#);
    }

    #[test]
    fn test_parse_ok_response() {
        let body = r#"{
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {"source": {"id": null, "name": "Hotel News Now"}, "author": "J. Doe",
                 "title": "Hotel construction pipeline grows", "description": "Developers add rooms",
                 "url": "https://hnn.example.com/1", "urlToImage": null,
                 "publishedAt": "2024-03-14T09:30:00Z", "content": "..."},
                {"source": {"id": null, "name": "x"}, "author": null, "title": "[Removed]",
                 "description": null, "url": "https://removed.com", "urlToImage": null,
                 "publishedAt": null, "content": null}
            ]
        }"#;
        let results = parse_response(200, body, &query()).unwrap();
        assert_eq!(results.len(), 2);

        let candidates: Vec<_> = results
            .into_iter()
            .filter_map(SourceResult::into_candidate)
            .collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].relevance, 1.0);
        assert_eq!(candidates[0].author.as_deref(), Some("J. Doe"));
        assert!(candidates[0].verified_source);
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        match parse_response(401, body, &query()) {
            Err(SourceError::Api {
                provider, status, message,
            }) => {
                assert_eq!(provider, "news_api");
                assert_eq!(status, 401);
                assert!(message.starts_with("apiKeyInvalid"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
