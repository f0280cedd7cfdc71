//! Trending discovery via the GitHub REST search API.
//!
//! Endpoint: /search/repositories?q=created:>=DATE [language:LANG]&sort=stars&order=desc
//! "Trending" here means the most-starred repositories created inside the
//! scope's period.

use super::types::*;
use super::DiscoverySource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("trend-miner/", env!("CARGO_PKG_VERSION"));

pub struct GitHubSearchSource {
    client: Client,
    api_base: String,
    token: Option<String>,
    per_page: u32,
}

impl GitHubSearchSource {
    pub fn new(api_base: &str, token: Option<String>, per_page: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build GitHub search client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            per_page: per_page.clamp(1, 100),
        })
    }
}

/// Build the `q=` search qualifier for a scope, anchored at `today`.
pub fn search_query(scope: &TrendingScope, today: NaiveDate) -> String {
    let since = today - ChronoDuration::days(scope.period.lookback_days());
    let mut q = format!("created:>={}", since.format("%Y-%m-%d"));
    if let Some(lang) = scope.language.as_deref().filter(|l| !l.is_empty()) {
        q.push_str(&format!(" language:{}", lang));
    }
    q
}

/// Map a search response body to discovered projects.
pub fn parse_search_response(json: &str) -> Result<Vec<Project>> {
    let resp: SearchResponse = serde_json::from_str(json)?;
    let mut projects = Vec::with_capacity(resp.items.len());
    for repo in resp.items {
        let owner = repo.owner.map(|o| o.login).unwrap_or_default();
        if owner.is_empty() || repo.name.is_empty() {
            tracing::warn!(full_name = %repo.full_name, "skipping search item without owner/name");
            continue;
        }
        projects.push(Project::discovered(
            owner,
            repo.name,
            repo.description.unwrap_or_default(),
            repo.html_url,
            repo.language.unwrap_or_default(),
            repo.stargazers_count,
        ));
    }
    Ok(projects)
}

#[async_trait]
impl DiscoverySource for GitHubSearchSource {
    fn name(&self) -> &str {
        "github-search"
    }

    async fn fetch_trending(&self, scope: &TrendingScope) -> Result<Vec<Project>> {
        let url = format!("{}/search/repositories", self.api_base);
        let query = search_query(scope, Utc::now().date_naive());
        let per_page = self.per_page.to_string();

        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", query.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("GitHub search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub search {} ({}): {}", scope, status, body);
        }

        let body = resp.text().await.context("failed to read GitHub search response")?;
        let projects = parse_search_response(&body).context("failed to parse GitHub search response")?;
        tracing::debug!(scope = %scope, count = projects.len(), "fetched trending projects");
        Ok(projects)
    }
}
