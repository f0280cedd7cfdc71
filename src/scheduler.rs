use crate::pipeline::{CycleReport, TrendPipeline};
use anyhow::{bail, Result};
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Drives every registered pipeline on its own task.
///
/// Each pipeline runs a cycle immediately, then once per interval. A cycle
/// that overruns its interval delays the next one; ticks missed meanwhile are
/// dropped, so one pipeline never overlaps itself.
#[derive(Default)]
pub struct Scheduler {
    pipelines: Vec<Arc<TrendPipeline>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline. A zero interval is rejected.
    pub fn register(&mut self, pipeline: TrendPipeline) -> Result<()> {
        if pipeline.interval.is_zero() {
            bail!("pipeline {}: interval must be greater than zero", pipeline.name);
        }
        tracing::debug!(pipeline = %pipeline.name, interval = ?pipeline.interval, "registered pipeline");
        self.pipelines.push(Arc::new(pipeline));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Spawn one periodic task per pipeline.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.pipelines
            .iter()
            .map(|p| tokio::spawn(run_periodically(p.clone())))
            .collect()
    }

    /// Start all pipelines and wait on them. Only returns if every task ends.
    pub async fn run_forever(&self) {
        for result in join_all(self.start()).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "pipeline task ended unexpectedly");
            }
        }
    }

    /// Run a single cycle of every pipeline concurrently.
    pub async fn run_once(&self) -> Vec<(String, Result<CycleReport>)> {
        let cycles = self.pipelines.iter().map(|p| async move {
            let result = guarded_cycle(p).await;
            log_cycle_error(p, &result);
            (p.name.clone(), result)
        });
        join_all(cycles).await
    }
}

async fn run_periodically(pipeline: Arc<TrendPipeline>) {
    tracing::info!(pipeline = %pipeline.name, scope = %pipeline.scope, interval = ?pipeline.interval, "pipeline started");

    let mut ticker = tokio::time::interval(pipeline.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // First tick completes immediately.
        ticker.tick().await;
        let result = guarded_cycle(&pipeline).await;
        log_cycle_error(&pipeline, &result);
    }
}

/// Run one cycle, turning a panic anywhere inside it into an error so the
/// pipeline keeps its schedule.
async fn guarded_cycle(pipeline: &TrendPipeline) -> Result<CycleReport> {
    match AssertUnwindSafe(pipeline.run_cycle()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => bail!("cycle panicked: {}", panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn log_cycle_error(pipeline: &TrendPipeline, result: &Result<CycleReport>) {
    if let Err(e) = result {
        tracing::error!(pipeline = %pipeline.name, error = %format!("{:#}", e), "cycle aborted");
    }
}
