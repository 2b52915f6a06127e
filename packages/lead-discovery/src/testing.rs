//! Testing utilities including mock implementations.
//!
//! These let the pipeline run end to end without network calls or real
//! sleeps: scripted sources, a scripted transport and a manual clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::error::{SourceError, TransportError};
use crate::evasion::{OutboundRequest, RawResponse, Transport};
use crate::sources::{
    ContentFetcher, IndustryArticle, LeadSource, NewsArticle, SearchHit, SourceQuery,
    SourceResult, TavilyHit,
};
use crate::types::SourceKind;

/// Clock whose time only moves when told to.
///
/// `sleep` records the requested duration, advances virtual time by it and
/// returns immediately.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 14, 10, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::at(start)
    }
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap();
        *self.now.lock().unwrap() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Transport that replays scripted responses per URL.
///
/// Each URL has a queue; once it runs dry the default response is used.
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<RawResponse, TransportError>>>>,
    default: Mutex<Result<RawResponse, TransportError>>,
    requests: Mutex<Vec<OutboundRequest>>,
    closed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Every unscripted request gets an empty 200.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Mutex::new(Ok(RawResponse::new(200, ""))),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_default(self, response: Result<RawResponse, TransportError>) -> Self {
        *self.default.lock().unwrap() = response;
        self
    }

    /// Queue responses for `url`, served in order.
    pub fn script(
        self,
        url: impl Into<String>,
        responses: impl IntoIterator<Item = Result<RawResponse, TransportError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .extend(responses);
        self
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(response) => response,
            None => self.default.lock().unwrap().clone(),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Counts searches in flight across every source sharing it.
#[derive(Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Most searches ever seen running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A source that returns canned records.
pub struct MockSource {
    kind: SourceKind,
    results: Vec<SourceResult>,
    failure: Option<String>,
    delay: Option<Duration>,
    gauge: Option<Arc<InFlightGauge>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            results: Vec::new(),
            failure: None,
            delay: None,
            gauge: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_results(mut self, results: Vec<SourceResult>) -> Self {
        self.results.extend(results);
        self
    }

    /// Add a record shaped like this source's own output.
    pub fn with_hit(mut self, title: &str, url: &str, snippet: &str) -> Self {
        let result = match self.kind {
            SourceKind::Tavily => SourceResult::Tavily(TavilyHit {
                url: url.to_string(),
                title: title.to_string(),
                content: snippet.to_string(),
                score: 0.8,
                published_date: None,
            }),
            SourceKind::NewsApi => SourceResult::NewsApi(NewsArticle {
                source: None,
                author: None,
                title: Some(title.to_string()),
                description: Some(snippet.to_string()),
                url: url.to_string(),
                url_to_image: None,
                published_at: None,
                content: None,
                relevance: 0.5,
            }),
            SourceKind::WebSearch => SourceResult::WebSearch(SearchHit {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
                relevance: 0.5,
            }),
            SourceKind::HotelNews | SourceKind::ConstructionNews => {
                SourceResult::Industry(IndustryArticle {
                    source: self.kind,
                    site: "mock".to_string(),
                    title: title.to_string(),
                    url: url.to_string(),
                    snippet: snippet.to_string(),
                    published_at: None,
                    relevance: 0.5,
                })
            }
        };
        self.results.push(result);
        self
    }

    /// Every search fails with this message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Hold each search for `delay` (real time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<InFlightGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadSource for MockSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn search(&self, _query: &SourceQuery) -> Result<Vec<SourceResult>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }
        match &self.failure {
            Some(message) => Err(SourceError::Api {
                provider: "mock",
                status: 500,
                message: message.clone(),
            }),
            None => Ok(self.results.clone()),
        }
    }
}

/// Content fetcher serving fixed page text by URL.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::Malformed(format!("no page for {}", url)))
    }
}
