// Integration tests for the fetch-filter-enrich-persist-notify cycle

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trend_miner::enrich::{Analyzer, ReadmeSource};
use trend_miner::feed::types::{Project, ProjectId, TrendingScope};
use trend_miner::feed::DiscoverySource;
use trend_miner::notify::{CallbackSink, FnSink};
use trend_miner::pipeline::{Collaborators, TrendPipeline};
use trend_miner::store::{BatchStore, ProcessedIndex};

struct ScriptedDiscovery {
    projects: Vec<Project>,
    fail: AtomicBool,
}

#[async_trait]
impl DiscoverySource for ScriptedDiscovery {
    fn name(&self) -> &str {
        "scripted"
    }
    async fn fetch_trending(&self, _scope: &TrendingScope) -> Result<Vec<Project>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("trending page unavailable");
        }
        Ok(self.projects.clone())
    }
}

/// Fails for the listed repo names, records every call.
struct FakeReadme {
    fail_for: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ReadmeSource for FakeReadme {
    async fn fetch(&self, _owner: &str, name: &str, timeout: Duration) -> Result<String> {
        assert_eq!(timeout, Duration::from_secs(10));
        self.calls.lock().unwrap().push(name.to_string());
        if self.fail_for.contains(name) {
            anyhow::bail!("404 Not Found");
        }
        Ok(format!("# {}\n\nreadme body", name))
    }
}

struct FakeAnalyzer {
    fail_for: HashSet<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, project: &Project) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.contains(&project.name) {
            anyhow::bail!("model overloaded");
        }
        Ok(format!("summary of {} ({} chars of readme)", project.name, project.readme.len()))
    }
}

/// Captures every batch it is handed.
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<Project>>>,
    dates: Mutex<Vec<NaiveDate>>,
}

#[async_trait]
impl CallbackSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }
    async fn notify(&self, date: NaiveDate, batch: &[Project]) -> Result<()> {
        self.batches.lock().unwrap().push(batch.to_vec());
        self.dates.lock().unwrap().push(date);
        Ok(())
    }
}

struct Harness {
    pipeline: TrendPipeline,
    discovery: Arc<ScriptedDiscovery>,
    readme: Arc<FakeReadme>,
    analyzer: Arc<FakeAnalyzer>,
    sink: Arc<RecordingSink>,
    store: Arc<BatchStore>,
    index: Arc<ProcessedIndex>,
}

fn project(name: &str, stars: u64) -> Project {
    Project::discovered("acme", name, format!("{} tool", name), format!("https://github.com/acme/{}", name), "Rust", stars)
}

fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn harness(dir: &Path, discovered: Vec<Project>, readme_fails: &[&str], analysis_fails: &[&str]) -> Harness {
    let store = Arc::new(BatchStore::open(dir).unwrap());
    harness_on(store, discovered, readme_fails, analysis_fails)
}

fn harness_on(
    store: Arc<BatchStore>,
    discovered: Vec<Project>,
    readme_fails: &[&str],
    analysis_fails: &[&str],
) -> Harness {
    let discovery = Arc::new(ScriptedDiscovery { projects: discovered, fail: AtomicBool::new(false) });
    let readme = Arc::new(FakeReadme { fail_for: names(readme_fails), calls: Mutex::new(Vec::new()) });
    let analyzer = Arc::new(FakeAnalyzer { fail_for: names(analysis_fails), calls: AtomicUsize::new(0) });
    let sink = Arc::new(RecordingSink::default());
    let index = Arc::new(ProcessedIndex::from_batches(&store.load_all().unwrap(), 7));

    let collaborators = Collaborators {
        discovery: discovery.clone(),
        readme: readme.clone(),
        analyzer: analyzer.clone(),
    };
    let mut pipeline = TrendPipeline::new("test", TrendingScope::default(), collaborators, store.clone(), index.clone());
    pipeline.add_callback(sink.clone());

    Harness { pipeline, discovery, readme, analyzer, sink, store, index }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_full_cycle_persists_notifies_and_indexes() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("alpha", 10), project("beta", 20)], &[], &[]);
    let today = day(2024, 4, 1);

    let report = h.pipeline.run_cycle_on(today).await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.fresh, 2);
    assert!(report.persisted);
    assert_eq!(report.callbacks_run, 1);

    let batches = h.sink.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 1, "one batch-level notification per cycle");
    assert_eq!(batches[0].len(), 2);
    assert!(batches[0].iter().all(|p| !p.readme.is_empty() && !p.analysis.is_empty()));

    let stored = h.store.load_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].date, today);
    assert_eq!(stored[0].projects, batches[0]);
    // Sinks get the storage date of the cycle, not the wall clock.
    assert_eq!(*h.sink.dates.lock().unwrap(), vec![today]);

    assert_eq!(h.index.last_processed(&ProjectId::new("acme", "alpha")), Some(today));
}

#[tokio::test]
async fn test_readme_failure_drops_only_that_project() {
    let tmp = tempfile::tempdir().unwrap();
    let discovered = vec![project("one", 1), project("two", 2), project("three", 3), project("four", 4)];
    let h = harness(tmp.path(), discovered, &["two"], &[]);

    let report = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap();
    assert_eq!(report.readme_failures, 1);
    assert_eq!(report.processed.len(), 3);

    // Projects after the failing one were still fetched, in discovery order.
    assert_eq!(*h.readme.calls.lock().unwrap(), vec!["one", "two", "three", "four"]);
    // Analyzer never saw the project whose README failed.
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 3);

    let notified: Vec<String> = h.sink.batches.lock().unwrap()[0].iter().map(|p| p.name.clone()).collect();
    assert_eq!(notified, vec!["one", "three", "four"]);
    let stored = h.store.load_all_projects().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|p| p.name != "two"));
    assert!(h.index.last_processed(&ProjectId::new("acme", "two")).is_none());
}

#[tokio::test]
async fn test_analysis_failure_drops_only_that_project() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("one", 1), project("two", 2)], &[], &["one"]);

    let report = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap();
    assert_eq!(report.analysis_failures, 1);
    assert_eq!(report.processed, vec![ProjectId::new("acme", "two")]);
}

#[tokio::test]
async fn test_rerun_with_same_discovery_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("alpha", 10), project("beta", 20)], &[], &[]);
    let today = day(2024, 4, 1);

    let first = h.pipeline.run_cycle_on(today).await.unwrap();
    assert_eq!(first.processed.len(), 2);
    let file_before = std::fs::read_to_string(h.store.batch_path(today)).unwrap();

    let second = h.pipeline.run_cycle_on(today).await.unwrap();
    assert_eq!(second.discovered, 2);
    assert_eq!(second.fresh, 0);
    assert!(second.processed.is_empty());
    assert!(!second.persisted);
    assert_eq!(second.callbacks_run, 0);

    assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
    assert_eq!(h.readme.calls.lock().unwrap().len(), 2);
    assert_eq!(std::fs::read_to_string(h.store.batch_path(today)).unwrap(), file_before);
}

#[tokio::test]
async fn test_project_is_refetched_once_window_expires() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("alpha", 10)], &[], &[]);
    let d = day(2024, 4, 1);

    h.pipeline.run_cycle_on(d).await.unwrap();
    let within = h.pipeline.run_cycle_on(d + ChronoDuration::days(6)).await.unwrap();
    assert_eq!(within.fresh, 0);

    let after = h.pipeline.run_cycle_on(d + ChronoDuration::days(7)).await.unwrap();
    assert_eq!(after.fresh, 1);
    assert!(after.persisted);
    assert_eq!(h.store.load_all().unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_on_disk_filters_first_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let today = day(2024, 4, 10);
    {
        let store = BatchStore::open(tmp.path()).unwrap();
        store.save(&[project("old", 1)], today - ChronoDuration::days(3)).unwrap();
    }

    let h = harness(tmp.path(), vec![project("old", 1), project("new", 2)], &[], &[]);
    let report = h.pipeline.run_cycle_on(today).await.unwrap();
    assert_eq!(report.fresh, 1);
    assert_eq!(report.processed, vec![ProjectId::new("acme", "new")]);
}

#[tokio::test]
async fn test_discovery_failure_aborts_without_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("alpha", 10)], &[], &[]);
    h.discovery.fail.store(true, Ordering::SeqCst);

    let err = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("trending page unavailable"));
    assert!(h.readme.calls.lock().unwrap().is_empty());
    assert!(h.sink.batches.lock().unwrap().is_empty());
    assert!(h.store.load_all().unwrap().is_empty());
    assert!(h.index.is_empty());

    // Next tick recovers on its own.
    h.discovery.fail.store(false, Ordering::SeqCst);
    let report = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap();
    assert_eq!(report.processed.len(), 1);
}

#[tokio::test]
async fn test_everything_failing_enrichment_skips_persist_and_notify() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path(), vec![project("a", 1), project("b", 2)], &["a"], &["b"]);

    let report = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap();
    assert!(report.processed.is_empty());
    assert!(!report.persisted);
    assert!(h.sink.batches.lock().unwrap().is_empty());
    assert!(h.store.load_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_persist_failure_still_notifies_but_leaves_index_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let today = day(2024, 4, 1);
    let h = harness(tmp.path(), vec![project("alpha", 10)], &[], &[]);
    // A directory where the batch file should be makes the write fail.
    std::fs::create_dir(h.store.batch_path(today)).unwrap();

    let report = h.pipeline.run_cycle_on(today).await.unwrap();
    assert!(!report.persisted);
    assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
    assert!(h.index.last_processed(&ProjectId::new("acme", "alpha")).is_none());

    // Unindexed, so the next cycle retries it.
    let retry = h.pipeline.run_cycle_on(today).await.unwrap();
    assert_eq!(retry.fresh, 1);
}

#[tokio::test]
async fn test_failing_callback_does_not_block_others() {
    let tmp = tempfile::tempdir().unwrap();
    let mut h = harness(tmp.path(), vec![project("alpha", 10)], &[], &[]);

    let failing: Arc<dyn CallbackSink> = Arc::new(FnSink::new("broken", |_| anyhow::bail!("webhook down")));
    let after = Arc::new(RecordingSink::default());
    h.pipeline.add_callback(failing);
    h.pipeline.add_callback(after.clone());

    let report = h.pipeline.run_cycle_on(day(2024, 4, 1)).await.unwrap();
    assert_eq!(report.callbacks_run, 3);
    assert_eq!(report.callback_failures, 1);
    assert!(report.persisted);
    assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
    assert_eq!(after.batches.lock().unwrap().len(), 1);
    assert_eq!(h.store.load_all_projects().unwrap().len(), 1);
    assert!(h.index.last_processed(&ProjectId::new("acme", "alpha")).is_some());
}

#[tokio::test]
async fn test_pipelines_sharing_a_store_merge_into_one_daily_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let today = day(2024, 4, 1);
    let store = Arc::new(BatchStore::open(tmp.path()).unwrap());
    let a = harness_on(store.clone(), vec![project("alpha", 1), project("shared", 5)], &[], &[]);
    let b = harness_on(store.clone(), vec![project("beta", 2), project("shared", 9)], &[], &[]);

    let (ra, rb) = tokio::join!(a.pipeline.run_cycle_on(today), b.pipeline.run_cycle_on(today));
    assert!(ra.unwrap().persisted);
    assert!(rb.unwrap().persisted);

    let batches = store.load_all().unwrap();
    assert_eq!(batches.len(), 1);
    let mut stored: Vec<String> = batches[0].projects.iter().map(|p| p.name.clone()).collect();
    stored.sort();
    assert_eq!(stored, vec!["alpha", "beta", "shared"]);
}
