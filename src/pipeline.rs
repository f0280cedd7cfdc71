use crate::config::{NotifyConfig, PipelineConfig};
use crate::enrich::{Analyzer, ReadmeSource};
use crate::feed::types::{Project, ProjectId, TrendingScope};
use crate::feed::DiscoverySource;
use crate::notify::{CallbackSink, LogSink, WebhookSink};
use crate::store::{BatchStore, ProcessedIndex};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_README_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// External services a pipeline talks to. Chosen at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn DiscoverySource>,
    pub readme: Arc<dyn ReadmeSource>,
    pub analyzer: Arc<dyn Analyzer>,
}

/// What happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    pub fresh: usize,
    pub readme_failures: usize,
    pub analysis_failures: usize,
    /// Identities that made it through enrichment, in discovery order.
    pub processed: Vec<ProjectId>,
    pub persisted: bool,
    pub callbacks_run: usize,
    pub callback_failures: usize,
}

enum EnrichOutcome {
    Enriched(Project),
    ReadmeFailed,
    AnalysisFailed,
}

/// One discovery scope with its own schedule, enrichment and callbacks.
///
/// The storage and the processed index may be shared with other pipelines.
pub struct TrendPipeline {
    pub name: String,
    pub scope: TrendingScope,
    pub interval: Duration,
    pub readme_timeout: Duration,
    pub enrich_concurrency: usize,

    collaborators: Collaborators,
    store: Arc<BatchStore>,
    index: Arc<ProcessedIndex>,
    sinks: Vec<Arc<dyn CallbackSink>>,
}

impl TrendPipeline {
    pub fn new(
        name: &str,
        scope: TrendingScope,
        collaborators: Collaborators,
        store: Arc<BatchStore>,
        index: Arc<ProcessedIndex>,
    ) -> Self {
        Self {
            name: name.to_string(),
            scope,
            interval: DEFAULT_INTERVAL,
            readme_timeout: DEFAULT_README_TIMEOUT,
            enrich_concurrency: 1,
            collaborators,
            store,
            index,
            sinks: Vec::new(),
        }
    }

    /// Build a pipeline and its notification sinks from config.
    pub fn from_config(
        config: &PipelineConfig,
        readme_timeout: Duration,
        collaborators: Collaborators,
        store: Arc<BatchStore>,
        index: Arc<ProcessedIndex>,
    ) -> Result<Self> {
        let mut pipeline = Self::new(&config.name, config.scope(), collaborators, store, index)
            .with_interval(Duration::from_secs(config.interval_s))
            .with_readme_timeout(readme_timeout)
            .with_enrich_concurrency(config.enrich_concurrency);

        for notify in &config.notify {
            let sink: Arc<dyn CallbackSink> = match notify {
                NotifyConfig::Log => Arc::new(LogSink::new(&config.name)),
                NotifyConfig::Webhook { url, timeout_ms } => Arc::new(
                    WebhookSink::new(&config.name, url, Duration::from_millis(*timeout_ms))
                        .with_context(|| format!("pipeline {}: bad webhook sink", config.name))?,
                ),
            };
            pipeline.add_callback(sink);
        }
        Ok(pipeline)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_readme_timeout(mut self, timeout: Duration) -> Self {
        self.readme_timeout = timeout;
        self
    }

    pub fn with_enrich_concurrency(mut self, n: usize) -> Self {
        self.enrich_concurrency = n.max(1);
        self
    }

    pub fn add_callback(&mut self, sink: Arc<dyn CallbackSink>) {
        self.sinks.push(sink);
    }

    pub fn callback_count(&self) -> usize {
        self.sinks.len()
    }

    /// Run one cycle dated with the local calendar day.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_on(Local::now().date_naive()).await
    }

    /// Run one cycle as if today were `today`.
    ///
    /// Only a discovery failure returns `Err`; it leaves all state untouched.
    /// Enrichment, persistence and callback failures are logged and counted
    /// in the report.
    pub async fn run_cycle_on(&self, today: NaiveDate) -> Result<CycleReport> {
        let discovered = self
            .collaborators
            .discovery
            .fetch_trending(&self.scope)
            .await
            .with_context(|| format!("{} discovery failed for {}", self.collaborators.discovery.name(), self.scope))?;

        let mut report = CycleReport {
            discovered: discovered.len(),
            ..Default::default()
        };
        tracing::info!(pipeline = %self.name, scope = %self.scope, count = discovered.len(), "discovered projects");

        let fresh = self.filter_fresh(discovered, today);
        report.fresh = fresh.len();
        if fresh.is_empty() {
            tracing::info!(pipeline = %self.name, "no new projects to process");
            return Ok(report);
        }
        tracing::info!(pipeline = %self.name, count = fresh.len(), "new projects to process");

        let outcomes: Vec<EnrichOutcome> = stream::iter(fresh)
            .map(|p| self.enrich(p))
            .buffered(self.enrich_concurrency.max(1))
            .collect()
            .await;

        let mut processed: Vec<Project> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                EnrichOutcome::Enriched(p) => processed.push(p),
                EnrichOutcome::ReadmeFailed => report.readme_failures += 1,
                EnrichOutcome::AnalysisFailed => report.analysis_failures += 1,
            }
        }
        report.processed = processed.iter().map(Project::id).collect();

        if processed.is_empty() {
            tracing::warn!(pipeline = %self.name, "every new project failed enrichment");
            return Ok(report);
        }

        report.persisted = self.persist(&processed, today).await;

        for sink in &self.sinks {
            report.callbacks_run += 1;
            if let Err(e) = sink.notify(today, &processed).await {
                report.callback_failures += 1;
                tracing::warn!(pipeline = %self.name, sink = sink.name(), error = %format!("{:#}", e), "callback failed");
            }
        }

        // Unpersisted projects stay unindexed so a later cycle retries them.
        if report.persisted {
            for p in &processed {
                self.index.mark_processed(p.id(), today);
            }
        }

        tracing::info!(
            pipeline = %self.name,
            discovered = report.discovered,
            fresh = report.fresh,
            processed = report.processed.len(),
            readme_failures = report.readme_failures,
            analysis_failures = report.analysis_failures,
            persisted = report.persisted,
            callback_failures = report.callback_failures,
            "cycle complete"
        );
        Ok(report)
    }

    /// Drop projects processed inside the recency window and repeats within
    /// this discovery result. Keeps discovery order.
    fn filter_fresh(&self, discovered: Vec<Project>, today: NaiveDate) -> Vec<Project> {
        let mut seen: HashSet<ProjectId> = HashSet::with_capacity(discovered.len());
        discovered
            .into_iter()
            .filter(|p| {
                let id = p.id();
                !self.index.is_recently_processed(&id, today) && seen.insert(id)
            })
            .collect()
    }

    async fn enrich(&self, mut project: Project) -> EnrichOutcome {
        let id = project.id();

        let fetch = self
            .collaborators
            .readme
            .fetch(&project.owner, &project.name, self.readme_timeout);
        match tokio::time::timeout(self.readme_timeout, fetch).await {
            Ok(Ok(readme)) => project.readme = readme,
            Ok(Err(e)) => {
                tracing::warn!(pipeline = %self.name, project = %id, error = %format!("{:#}", e), "README fetch failed");
                return EnrichOutcome::ReadmeFailed;
            }
            Err(_) => {
                tracing::warn!(pipeline = %self.name, project = %id, timeout = ?self.readme_timeout, "README fetch timed out");
                return EnrichOutcome::ReadmeFailed;
            }
        }

        match self.collaborators.analyzer.analyze(&project).await {
            Ok(analysis) => project.analysis = analysis,
            Err(e) => {
                tracing::warn!(pipeline = %self.name, project = %id, error = %format!("{:#}", e), "analysis failed");
                return EnrichOutcome::AnalysisFailed;
            }
        }

        EnrichOutcome::Enriched(project)
    }

    async fn persist(&self, processed: &[Project], today: NaiveDate) -> bool {
        let store = self.store.clone();
        let batch = processed.to_vec();
        match tokio::task::spawn_blocking(move || store.save(&batch, today)).await {
            Ok(Ok(total)) => {
                tracing::info!(pipeline = %self.name, date = %today, saved = processed.len(), total, "batch persisted");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(pipeline = %self.name, error = %format!("{:#}", e), "failed to persist batch");
                false
            }
            Err(e) => {
                tracing::error!(pipeline = %self.name, error = %e, "persist task panicked");
                false
            }
        }
    }
}
