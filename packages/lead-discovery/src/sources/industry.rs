//! Trade-news sites scraped through CSS-selector profiles.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{parse_date, squash_whitespace, LeadSource, SourceQuery, SourceResult};
use crate::error::SourceError;
use crate::evasion::{EvasionLayer, RequestOptions};
use crate::types::{CandidateResult, SourceKind};

/// How to search one site and read its result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: String,
    pub kind: SourceKind,
    /// Search URL with a `{query}` placeholder
    pub search_url: String,
    pub item_selector: String,
    pub title_selector: String,
    /// Element carrying the href; the title element when None
    pub link_selector: Option<String>,
    pub snippet_selector: Option<String>,
    pub date_selector: Option<String>,
}

impl SiteProfile {
    /// Hotel development news.
    pub fn hospitality_net() -> Self {
        Self {
            name: "hospitalitynet".to_string(),
            kind: SourceKind::HotelNews,
            search_url: "https://www.hospitalitynet.org/search.html?q={query}".to_string(),
            item_selector: "article, .search-result, .news-item".to_string(),
            title_selector: "h2, h3, .title".to_string(),
            link_selector: Some("a[href]".to_string()),
            snippet_selector: Some("p, .summary, .teaser".to_string()),
            date_selector: Some("time".to_string()),
        }
    }

    /// Construction project news.
    pub fn construction_dive() -> Self {
        Self {
            name: "constructiondive".to_string(),
            kind: SourceKind::ConstructionNews,
            search_url: "https://www.constructiondive.com/search/?q={query}".to_string(),
            item_selector: ".feed__item, .search-results__item, article".to_string(),
            title_selector: ".feed__title, h3".to_string(),
            link_selector: Some("a[href]".to_string()),
            snippet_selector: Some(".feed__description, p".to_string()),
            date_selector: Some("time, .feed__date".to_string()),
        }
    }

    pub fn search_url_for(&self, query: &SourceQuery) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.joined().as_bytes()).collect();
        self.search_url.replace("{query}", &encoded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndustryArticle {
    pub source: SourceKind,
    pub site: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub published_at: Option<String>,
    pub relevance: f32,
}

pub struct IndustrySiteSource {
    evasion: Arc<EvasionLayer>,
    profile: SiteProfile,
}

impl IndustrySiteSource {
    pub fn new(evasion: Arc<EvasionLayer>, profile: SiteProfile) -> Self {
        Self { evasion, profile }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }
}

#[async_trait]
impl LeadSource for IndustrySiteSource {
    fn kind(&self) -> SourceKind {
        self.profile.kind
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError> {
        let url = self.profile.search_url_for(query);
        let response = self.evasion.request(&url, &RequestOptions::default()).await?;

        let articles = parse_articles(&self.profile, &url, &response.body, query)?;
        debug!(
            site = %self.profile.name,
            results = articles.len(),
            "Industry site search complete"
        );
        Ok(articles
            .into_iter()
            .take(query.max_results)
            .map(SourceResult::Industry)
            .collect())
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Malformed(format!("selector {}: {}", css, e)))
}

/// Parse a results page with `profile`. Only items mentioning at least one keyword are kept.
pub fn parse_articles(
    profile: &SiteProfile,
    page_url: &str,
    html: &str,
    query: &SourceQuery,
) -> Result<Vec<IndustryArticle>, SourceError> {
    let base = Url::parse(page_url)
        .map_err(|e| SourceError::Malformed(format!("page url {}: {}", page_url, e)))?;
    let item_sel = selector(&profile.item_selector)?;
    let title_sel = selector(&profile.title_selector)?;
    let link_sel = profile.link_selector.as_deref().map(selector).transpose()?;
    let snippet_sel = profile.snippet_selector.as_deref().map(selector).transpose()?;
    let date_sel = profile.date_selector.as_deref().map(selector).transpose()?;

    let document = Html::parse_document(html);
    let mut articles: Vec<IndustryArticle> = Vec::new();

    for item in document.select(&item_sel) {
        let Some(title_el) = item.select(&title_sel).next() else {
            continue;
        };
        let title = squash_whitespace(&title_el.text().collect::<String>());

        let href = match &link_sel {
            Some(sel) => item
                .select(sel)
                .find_map(|a| a.value().attr("href"))
                .or_else(|| title_el.value().attr("href")),
            None => title_el.value().attr("href"),
        };
        let Some(url) = href.and_then(|h| base.join(h).ok()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }

        let snippet = snippet_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .map(|el| squash_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();
        let published_at = date_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .map(|el| {
                el.value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| squash_whitespace(&el.text().collect::<String>()))
            });

        let relevance = query.relevance_of(&format!("{} {}", title, snippet));
        if relevance == 0.0 {
            continue;
        }

        let url = url.to_string();
        if articles.iter().any(|a| a.url == url) {
            continue;
        }
        articles.push(IndustryArticle {
            source: profile.kind,
            site: profile.name.clone(),
            title,
            url,
            snippet,
            published_at,
            relevance,
        });
    }
    Ok(articles)
}

pub(crate) fn to_candidate(article: IndustryArticle) -> Option<CandidateResult> {
    let published_at = article.published_at.as_deref().and_then(parse_date);
    Some(
        CandidateResult::new(article.source, article.title, article.url)
            .with_snippet(article.snippet)
            .with_relevance(article.relevance)
            .with_published_at(published_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article>
            <h3><a href="/news/4120.html">Marriott signs 220-room hotel in Nashville, TN</a></h3>
            <p>Construction is set to begin in 2025.</p>
            <time datetime="2024-03-14">March 14</time>
          </article>
          <article>
            <h3><a href="/news/4121.html">Quarterly RevPAR report</a></h3>
            <p>Occupancy trends across Europe.</p>
          </article>
          <article>
            <h3><a href="https://www.hospitalitynet.org/news/4120.html">Duplicate hotel listing</a></h3>
          </article>
        </body></html>
    "#;

    #[test]
    fn test_parse_articles_filters_and_resolves() {
        let profile = SiteProfile::hospitality_net();
        let query = SourceQuery::new(vec!["hotel".into(), "construction".into()], 10);
        let page_url = profile.search_url_for(&query);
        let articles = parse_articles(&profile, &page_url, PAGE, &query).unwrap();

        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.url, "https://www.hospitalitynet.org/news/4120.html");
        assert_eq!(a.source, SourceKind::HotelNews);
        assert_eq!(a.published_at.as_deref(), Some("2024-03-14"));
        assert_eq!(a.relevance, 1.0);
    }

    #[test]
    fn test_search_url_encodes_query() {
        let query = SourceQuery::new(vec!["hotel".into(), "new build".into()], 10);
        assert_eq!(
            SiteProfile::construction_dive().search_url_for(&query),
            "https://www.constructiondive.com/search/?q=hotel+new+build"
        );
    }
}
