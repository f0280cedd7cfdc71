pub mod openai;
pub mod readme;

use crate::feed::types::Project;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Fetches the raw README text of a repository.
#[async_trait]
pub trait ReadmeSource: Send + Sync {
    /// Must give up once `timeout` has elapsed.
    async fn fetch(&self, owner: &str, name: &str, timeout: Duration) -> Result<String>;
}

/// Produces a textual analysis of a project whose README is populated.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, project: &Project) -> Result<String>;
}
