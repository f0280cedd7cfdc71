//! Consumers of a cycle's processed batch.

use crate::feed::github_search::USER_AGENT;
use crate::feed::types::Project;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Receives the full batch once per cycle, along with the date it was
/// stored under. Errors are logged by the pipeline and never retried.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, date: NaiveDate, batch: &[Project]) -> Result<()>;
}

/// Logs one line per project.
pub struct LogSink {
    pipeline: String,
}

impl LogSink {
    pub fn new(pipeline: &str) -> Self {
        Self { pipeline: pipeline.to_string() }
    }
}

#[async_trait]
impl CallbackSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, date: NaiveDate, batch: &[Project]) -> Result<()> {
        for p in batch {
            tracing::info!(
                pipeline = %self.pipeline,
                %date,
                project = %p.id(),
                stars = p.stars,
                language = %p.language,
                analysis_len = p.analysis.len(),
                "new trending project"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    pipeline: &'a str,
    date: String,
    projects: &'a [Project],
}

/// POSTs the batch as JSON to a fixed URL.
pub struct WebhookSink {
    client: Client,
    url: String,
    pipeline: String,
}

impl WebhookSink {
    pub fn new(pipeline: &str, url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            pipeline: pipeline.to_string(),
        })
    }
}

fn webhook_body(pipeline: &str, date: NaiveDate, batch: &[Project]) -> Result<String> {
    let payload = WebhookPayload {
        pipeline,
        date: date.format("%Y-%m-%d").to_string(),
        projects: batch,
    };
    serde_json::to_string(&payload).context("failed to serialize webhook payload")
}

#[async_trait]
impl CallbackSink for WebhookSink {
    fn name(&self) -> &str {
        &self.url
    }

    async fn notify(&self, date: NaiveDate, batch: &[Project]) -> Result<()> {
        let body = webhook_body(&self.pipeline, date, batch)?;
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook {} ({}): {}", self.url, status, body);
        }
        Ok(())
    }
}

type BatchCallback = dyn Fn(&[Project]) -> Result<()> + Send + Sync;

/// Wraps a plain closure so library users can register callbacks directly.
pub struct FnSink {
    name: String,
    callback: Box<BatchCallback>,
}

impl FnSink {
    pub fn new<F>(name: &str, callback: F) -> Self
    where
        F: Fn(&[Project]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl CallbackSink for FnSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, _date: NaiveDate, batch: &[Project]) -> Result<()> {
        (self.callback)(batch)
    }
}
