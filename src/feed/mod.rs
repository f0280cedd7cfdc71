pub mod github_search;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use types::{Project, TrendingScope};

/// Source of candidate trending projects.
///
/// Returned projects carry metadata only; README and analysis are filled in
/// later by the pipeline. No ordering is required.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_trending(&self, scope: &TrendingScope) -> Result<Vec<Project>>;
}
