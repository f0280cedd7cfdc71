use crate::feed::types::{Period, TrendingScope};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
}

fn default_storage_dir() -> PathBuf { PathBuf::from("data") }
fn default_recency_window_days() -> i64 { 7 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            recency_window_days: default_recency_window_days(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_readme_timeout")]
    pub readme_timeout_ms: u64,
    #[serde(default = "default_github_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_github_api() -> String { "https://api.github.com".to_string() }
fn default_readme_timeout() -> u64 { 10_000 }
fn default_github_timeout() -> u64 { 30_000 }
fn default_per_page() -> u32 { 25 }

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            readme_timeout_ms: default_readme_timeout(),
            request_timeout_ms: default_github_timeout(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_readme_chars")]
    pub max_readme_chars: usize,
    #[serde(default = "default_analyzer_timeout")]
    pub request_timeout_ms: u64,
}

fn default_analyzer_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 5000 }
fn default_max_readme_chars() -> usize { 20_000 }
fn default_analyzer_timeout() -> u64 { 120_000 }

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: default_analyzer_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_readme_chars: default_max_readme_chars(),
            request_timeout_ms: default_analyzer_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Write logs here instead of stdout.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,
    #[serde(default = "default_notify")]
    pub notify: Vec<NotifyConfig>,
}

fn default_interval_s() -> u64 { 3600 }
fn default_enrich_concurrency() -> usize { 1 }
fn default_notify() -> Vec<NotifyConfig> { vec![NotifyConfig::Log] }

impl PipelineConfig {
    pub fn scope(&self) -> TrendingScope {
        TrendingScope {
            period: self.period,
            language: self.language.clone().filter(|l| !l.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifyConfig {
    Log,
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout")]
        timeout_ms: u64,
    },
}

fn default_webhook_timeout() -> u64 { 10_000 }

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            anyhow::bail!("config must define at least one [[pipelines]] entry");
        }
        if self.storage.recency_window_days < 1 {
            anyhow::bail!("storage.recency_window_days must be >= 1");
        }
        let mut names = HashSet::new();
        for p in &self.pipelines {
            if p.name.trim().is_empty() {
                anyhow::bail!("pipeline name cannot be empty");
            }
            if !names.insert(p.name.as_str()) {
                anyhow::bail!("duplicate pipeline name: {}", p.name);
            }
            if p.interval_s == 0 {
                anyhow::bail!("pipeline {}: interval_s must be > 0", p.name);
            }
            if p.enrich_concurrency == 0 {
                anyhow::bail!("pipeline {}: enrich_concurrency must be >= 1", p.name);
            }
        }
        Ok(())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        for (key, value) in parse_env_lines(&content) {
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }

    /// Optional: unauthenticated GitHub calls work, with a lower rate limit.
    pub fn github_token() -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|t| sanitize_key(&t))
            .filter(|t| !t.is_empty())
    }

    /// Comes from the environment, or is prompted at startup and saved to .env.
    pub fn openai_api_key() -> Result<String> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(sanitize_key(&key)),
            _ => {
                let key = prompt("OpenAI API Key")?;
                save_env_var("OPENAI_API_KEY", &key);
                Ok(key)
            }
        }
    }
}

/// KEY=VALUE pairs from a .env body; comments, blanks and a BOM are skipped.
fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .map(|line| line.trim().trim_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"').trim_matches('\'')))
        .collect()
}

fn prompt(label: &str) -> Result<String> {
    print!("  {} > ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} cannot be empty", label);
    }
    Ok(value)
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

/// Append a KEY=VALUE line to .env and set it in the current process.
fn save_env_var(key: &str, value: &str) {
    std::env::set_var(key, value);
    let path = Path::new(ENV_FILE);
    let mut contents = std::fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{}={}\n", key, value));
    if let Err(e) = std::fs::write(path, contents) {
        tracing::warn!(error = %e, "failed to save {} to .env", key);
    }
}
