//! Full-page text fetches for the enrichment stage.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::squash_whitespace;
use crate::error::SourceError;
use crate::evasion::{EvasionLayer, RequestOptions};

/// Cap on enriched text per candidate.
pub const MAX_CONTENT_CHARS: usize = 4_000;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Readable text of the page at `url`.
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError>;
}

pub struct EvasionContentFetcher {
    evasion: Arc<EvasionLayer>,
    max_chars: usize,
}

impl EvasionContentFetcher {
    pub fn new(evasion: Arc<EvasionLayer>) -> Self {
        Self {
            evasion,
            max_chars: MAX_CONTENT_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl ContentFetcher for EvasionContentFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let response = self.evasion.request(url, &RequestOptions::default()).await?;
        let text = extract_main_text(&response.body);
        Ok(text.chars().take(self.max_chars).collect())
    }
}

/// Text of the main content area, falling back to paragraphs of the whole body.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let main_selectors = [
        "main",
        "article",
        "[role='main']",
        "#content",
        "#main",
        ".content",
        ".post-content",
        ".entry-content",
    ];

    for css in main_selectors {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(main) = document.select(&selector).next() {
            let text = squash_whitespace(&main.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return text;
            }
        }
    }

    // No main area: paragraphs only, which skips nav, scripts and footers
    match Selector::parse("p") {
        Ok(p) => squash_whitespace(
            &document
                .select(&p)
                .map(|el| el.text().collect::<String>())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_article() {
        let html = r#"<html><body><nav>Home | About</nav>
            <article><h1>Resort plans</h1><p>The 300-key resort will cost $90 million.</p></article>
            <footer>Copyright</footer></body></html>"#;
        assert_eq!(
            extract_main_text(html),
            "Resort plans The 300-key resort will cost $90 million."
        );
    }

    #[test]
    fn test_extract_falls_back_to_paragraphs() {
        let html = r#"<html><body><div>menu</div><p>First.</p><script>var x;</script><p>Second.</p></body></html>"#;
        assert_eq!(extract_main_text(html), "First. Second.");
    }
}
