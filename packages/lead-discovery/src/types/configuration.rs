//! Discovery configurations and their run frequency.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Hour of day (UTC) that daily, weekly and monthly runs are anchored to.
pub const RUN_ANCHOR_HOUR: u32 = 9;

/// An external data provider a configuration can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Tavily,
    NewsApi,
    WebSearch,
    HotelNews,
    ConstructionNews,
}

/// Priority group of a source. Groups are queried and deduplicated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceGroup {
    /// API-backed, verified
    Api,
    /// Scraped general web search
    Web,
    /// Scraped industry-specific sites
    Industry,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Tavily,
        SourceKind::NewsApi,
        SourceKind::WebSearch,
        SourceKind::HotelNews,
        SourceKind::ConstructionNews,
    ];

    pub fn group(self) -> SourceGroup {
        match self {
            SourceKind::Tavily | SourceKind::NewsApi => SourceGroup::Api,
            SourceKind::WebSearch => SourceGroup::Web,
            SourceKind::HotelNews | SourceKind::ConstructionNews => SourceGroup::Industry,
        }
    }

    /// API-backed sources are verified; scraped sources are not.
    pub fn is_verified(self) -> bool {
        self.group() == SourceGroup::Api
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Tavily => "tavily",
            SourceKind::NewsApi => "news_api",
            SourceKind::WebSearch => "web_search",
            SourceKind::HotelNews => "hotel_news",
            SourceKind::ConstructionNews => "construction_news",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How often a configuration runs.
///
/// Every variant resolves to a 6-field cron expression
/// (`sec min hour day-of-month month day-of-week`, UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expression", rename_all = "snake_case")]
pub enum Frequency {
    /// Top of every hour
    Hourly,
    /// Every day at the anchor hour
    Daily,
    /// Every Monday at the anchor hour
    Weekly,
    /// First of the month at the anchor hour
    Monthly,
    /// Operator-supplied cron expression (5 or 6 fields)
    Custom(String),
}

impl Frequency {
    pub fn cron_expression(&self) -> String {
        match self {
            Frequency::Hourly => "0 0 * * * *".to_string(),
            Frequency::Daily => format!("0 0 {} * * *", RUN_ANCHOR_HOUR),
            Frequency::Weekly => format!("0 0 {} * * Mon", RUN_ANCHOR_HOUR),
            Frequency::Monthly => format!("0 0 {} 1 * *", RUN_ANCHOR_HOUR),
            Frequency::Custom(expression) => normalize_cron(expression),
        }
    }

    pub fn schedule(&self) -> Result<Schedule, ValidationError> {
        let expression = self.cron_expression();
        Schedule::from_str(&expression)
            .map_err(|e| ValidationError::InvalidFrequency(format!("{}: {}", expression, e)))
    }

    /// First trigger strictly after `after`, or None for an unparseable custom expression.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule().ok()?.after(&after).next()
    }
}

/// Prepend a seconds field to standard 5-field cron expressions.
fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// A saved discovery request owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
    pub sources: Vec<SourceKind>,
    pub frequency: Frequency,
    pub max_results: usize,
    pub active: bool,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Configuration {
    /// Create an active daily configuration with every source enabled.
    pub fn new(
        owner_id: Uuid,
        name: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            sources: SourceKind::ALL.to_vec(),
            frequency: Frequency::Daily,
            max_results: 50,
            active: true,
            last_run_at: None,
            next_run_at: None,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourceKind>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Reject configurations that must never produce a job.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.search_keywords().is_empty() {
            return Err(ValidationError::NoKeywords);
        }
        if self.enabled_sources().is_empty() {
            return Err(ValidationError::NoSources);
        }
        if self.max_results == 0 {
            return Err(ValidationError::ZeroMaxResults);
        }
        self.frequency.schedule()?;
        Ok(())
    }

    /// Trimmed, non-empty keywords in their original order.
    pub fn search_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Enabled sources with duplicates removed, first occurrence kept.
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        let mut seen = Vec::with_capacity(self.sources.len());
        for kind in &self.sources {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        seen
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            id: self.id,
            name: self.name.clone(),
            keywords: self.search_keywords(),
            sources: self.enabled_sources(),
            frequency: self.frequency.clone(),
            max_results: self.max_results,
        }
    }
}

/// The parts of a configuration echoed back by the run-now trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
    pub sources: Vec<SourceKind>,
    pub frequency: Frequency,
    pub max_results: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> Configuration {
        Configuration::new(Uuid::new_v4(), "Hotels", ["hotel", "construction"])
    }

    #[test]
    fn test_daily_run_anchors_to_next_morning() {
        let created = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();
        let next = Frequency::Daily.next_run_after(created).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_run_before_anchor_is_same_day() {
        let created = Utc.with_ymd_and_hms(2024, 3, 14, 7, 30, 0).unwrap();
        let next = Frequency::Daily.next_run_after(created).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_hourly_run_is_top_of_next_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 10, 17, 42).unwrap();
        let next = Frequency::Hourly.next_run_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 14, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_weekly_run_lands_on_monday() {
        // 2024-03-14 is a Thursday
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();
        let next = Frequency::Weekly.next_run_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_monthly_run_lands_on_first() {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();
        let next = Frequency::Monthly.next_run_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_custom_five_field_expression_is_normalized() {
        let freq = Frequency::Custom("30 6 * * *".to_string());
        assert_eq!(freq.cron_expression(), "0 30 6 * * *");
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap();
        assert_eq!(
            freq.next_run_after(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_blank_keywords() {
        let mut c = config();
        c.keywords = vec!["  ".to_string(), String::new()];
        assert_eq!(c.validate(), Err(ValidationError::NoKeywords));
    }

    #[test]
    fn test_validate_rejects_bad_custom_frequency() {
        let c = config().with_frequency(Frequency::Custom("every tuesday".to_string()));
        assert!(matches!(
            c.validate(),
            Err(ValidationError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_sources_and_zero_limit() {
        assert_eq!(
            config().with_sources([]).validate(),
            Err(ValidationError::NoSources)
        );
        assert_eq!(
            config().with_max_results(0).validate(),
            Err(ValidationError::ZeroMaxResults)
        );
    }

    #[test]
    fn test_enabled_sources_deduplicates_in_order() {
        let c = config().with_sources([
            SourceKind::WebSearch,
            SourceKind::Tavily,
            SourceKind::WebSearch,
        ]);
        assert_eq!(
            c.enabled_sources(),
            vec![SourceKind::WebSearch, SourceKind::Tavily]
        );
    }

    #[test]
    fn test_frequency_serde_shape() {
        let json = serde_json::to_value(Frequency::Custom("0 0 * * * *".into())).unwrap();
        assert_eq!(json["kind"], "custom");
        let daily: Frequency = serde_json::from_str(r#"{"kind":"daily"}"#).unwrap();
        assert_eq!(daily, Frequency::Daily);
    }
}
