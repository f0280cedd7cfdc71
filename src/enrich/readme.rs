use super::ReadmeSource;
use crate::feed::github_search::USER_AGENT;
use crate::feed::types::ReadmeResponse;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use std::time::Duration;

pub struct GitHubReadmeClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubReadmeClient {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build GitHub readme client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

/// Decode the readme endpoint body into README text.
///
/// GitHub wraps the base64 payload at 60 columns, so whitespace is stripped
/// before decoding. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_readme_response(json: &str) -> Result<String> {
    let resp: ReadmeResponse = serde_json::from_str(json)?;
    match resp.encoding.as_str() {
        "base64" => {
            let compact: String = resp.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = STANDARD.decode(compact).context("README content is not valid base64")?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        "" | "utf-8" => Ok(resp.content),
        other => anyhow::bail!("unsupported README encoding: {}", other),
    }
}

#[async_trait]
impl ReadmeSource for GitHubReadmeClient {
    async fn fetch(&self, owner: &str, name: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/repos/{}/{}/readme", self.api_base, owner, name);

        let mut req = self
            .client
            .get(&url)
            .timeout(timeout)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("README request failed for {}/{}", owner, name))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("README {}/{} ({}): {}", owner, name, status, body);
        }

        let body = resp.text().await.context("failed to read README response")?;
        let readme = decode_readme_response(&body)?;
        tracing::debug!(project = %format!("{}/{}", owner, name), len = readme.len(), "fetched README");
        Ok(readme)
    }
}
