use anyhow::{Context, Result};
use dotenvy::dotenv;
use lead_discovery::{Configuration, PipelineSettings, ProxyEndpoint};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub tavily_api_key: Option<String>,
    pub news_api_key: Option<String>,
    /// Comma-separated `scheme://[user:pass@]host:port` list
    pub proxies: Vec<String>,
    /// JSON array of configurations to load and schedule at startup
    pub configurations_path: Option<PathBuf>,
    pub fan_out: Option<usize>,
    pub job_grace_secs: Option<u64>,
    pub requests_per_second: Option<u32>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            tavily_api_key: non_empty("TAVILY_API_KEY"),
            news_api_key: non_empty("NEWS_API_KEY"),
            proxies: list("DISCOVERY_PROXIES"),
            configurations_path: non_empty("DISCOVERY_CONFIGS_PATH").map(PathBuf::from),
            fan_out: parsed("DISCOVERY_FAN_OUT")?,
            job_grace_secs: parsed("DISCOVERY_JOB_GRACE_SECS")?,
            requests_per_second: parsed("DISCOVERY_REQUESTS_PER_SECOND")?,
            allowed_origins: list("ALLOWED_ORIGINS"),
        })
    }

    /// Pipeline settings derived from the environment.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let proxies = self
            .proxies
            .iter()
            .map(|raw| ProxyEndpoint::parse(raw).with_context(|| "Invalid entry in DISCOVERY_PROXIES"))
            .collect::<Result<Vec<_>>>()?;

        let mut settings = PipelineSettings::default().with_proxies(proxies);
        if let Some(key) = &self.tavily_api_key {
            settings = settings.with_tavily_api_key(key.as_str());
        }
        if let Some(key) = &self.news_api_key {
            settings = settings.with_news_api_key(key.as_str());
        }
        if let Some(fan_out) = self.fan_out {
            settings = settings.with_fan_out(fan_out);
        }
        if let Some(secs) = self.job_grace_secs {
            settings = settings.with_job_grace_period(Duration::from_secs(secs));
        }
        if let Some(rps) = self.requests_per_second {
            // 0 disables the cap
            settings = settings.with_requests_per_second(Some(rps).filter(|r| *r > 0));
        }
        Ok(settings)
    }

    /// Configurations to seed the store with. Empty when no path is set.
    pub fn load_configurations(&self) -> Result<Vec<Configuration>> {
        let Some(path) = &self.configurations_path else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse configurations in {}", path.display()))
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn list(key: &str) -> Vec<String> {
    non_empty(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{} must be a valid number", key))
}
