use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::sources::http::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sources: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_sources: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Forum thread index (HTML)
    Forum,
    /// Blog article page (HTML)
    Blog,
    /// Community JSON listing
    Listing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    /// Base for relative links; defaults to `url`
    pub base_url: Option<String>,
    pub selectors: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_path")]
    pub csv_log_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub central_api_url: Option<String>,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            central_api_url: None,
            app_id: default_app_id(),
            recipients: Vec::new(),
        }
    }
}

fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 4 }
fn default_true() -> bool { true }
fn default_csv_path() -> String { "logs/runs.csv".to_string() }
fn default_app_id() -> String { "orlando-deals".to_string() }

/// Secrets and per-deployment overrides read from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub database_path: Option<String>,
    pub central_api_url: Option<String>,
    pub alert_recipients: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;

        if let Some(dup) = config
            .sources
            .iter()
            .enumerate()
            .find(|(i, s)| config.sources[..*i].iter().any(|o| o.name == s.name))
        {
            anyhow::bail!("Duplicate source name: {}", dup.1.name);
        }

        Ok(config)
    }

    /// Environment values take precedence over the file
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(path) = &env.database_path {
            self.system.database_path = path.clone();
        }
        if let Some(url) = &env.central_api_url {
            self.alerts.central_api_url = Some(url.clone());
        }
        if !env.alert_recipients.is_empty() {
            self.alerts.recipients = env.alert_recipients.clone();
        }
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_path: std::env::var("DEAL_RADAR_DB").ok(),
            central_api_url: std::env::var("CENTRAL_API_URL").ok(),
            alert_recipients: std::env::var("ALERT_RECIPIENTS")
                .map(|v| split_recipients(&v))
                .unwrap_or_default(),
        })
    }
}

fn split_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
