//! Date-partitioned JSON batch files.
//!
//! Layout: `<dir>/projects_YYYY-MM-DD.json`, each a JSON array of projects.
//! At most one file per date; same-day saves merge by identity.

use super::Batch;
use crate::feed::types::{Project, ProjectId};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const FILE_PREFIX: &str = "projects_";
const FILE_EXT: &str = ".json";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct BatchStore {
    dir: PathBuf,
    /// Serializes read-merge-write cycles on this instance.
    write_lock: Mutex<()>,
}

pub fn batch_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format(DATE_FORMAT), FILE_EXT)
}

/// Parse the date out of a batch file name, `None` if it isn't one.
pub fn parse_batch_file_name(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXT)?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

/// Merge `incoming` over `existing` by identity.
///
/// Existing entries keep their position; an incoming project with the same
/// identity replaces it in place. New identities are appended in order.
pub fn merge_projects(existing: Vec<Project>, incoming: &[Project]) -> Vec<Project> {
    let mut merged = existing;
    let mut positions: HashMap<ProjectId, usize> = HashMap::with_capacity(merged.len());
    for (i, p) in merged.iter().enumerate() {
        positions.insert(p.id(), i);
    }
    for p in incoming {
        match positions.get(&p.id()) {
            Some(&i) => merged[i] = p.clone(),
            None => {
                positions.insert(p.id(), merged.len());
                merged.push(p.clone());
            }
        }
    }
    merged
}

impl BatchStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn batch_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(batch_file_name(date))
    }

    /// Load every readable batch, sorted by date.
    ///
    /// Files with an unparseable name or body are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<Batch>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_all_unlocked()
    }

    fn load_all_unlocked(&self) -> Result<Vec<Batch>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list storage directory: {}", self.dir.display()))?;

        let mut batches = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read storage directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !file_name.ends_with(FILE_EXT) || !path.is_file() {
                continue;
            }
            let Some(date) = parse_batch_file_name(file_name) else {
                tracing::warn!(file = %path.display(), "skipping file: cannot parse date from name");
                continue;
            };
            match read_batch_file(&path) {
                Ok(projects) => batches.push(Batch { date, projects }),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %format!("{:#}", e), "skipping unreadable batch file");
                }
            }
        }

        batches.sort_by_key(|b| b.date);
        tracing::debug!(count = batches.len(), dir = %self.dir.display(), "loaded batches");
        Ok(batches)
    }

    /// Every stored project across all dates, in no particular order.
    pub fn load_all_projects(&self) -> Result<Vec<Project>> {
        Ok(self.load_all()?.into_iter().flat_map(|b| b.projects).collect())
    }

    /// Merge `projects` into the batch for `date` and rewrite the file.
    ///
    /// Returns the number of projects in the merged batch. An empty input is
    /// a no-op returning 0.
    pub fn save(&self, projects: &[Project], date: NaiveDate) -> Result<usize> {
        if projects.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.batch_path(date);

        let existing = match read_batch_file(&path) {
            Ok(existing) => existing,
            Err(e) if is_not_found(&e) => Vec::new(),
            Err(e) if is_parse_error(&e) => {
                let aside = corrupt_aside_path(&path);
                tracing::warn!(
                    file = %path.display(),
                    moved_to = %aside.display(),
                    error = %format!("{:#}", e),
                    "existing batch is corrupt, replacing it"
                );
                fs::rename(&path, &aside)
                    .with_context(|| format!("Failed to move corrupt batch aside: {}", path.display()))?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let merged = merge_projects(existing, projects);
        let json = serde_json::to_string_pretty(&merged).context("Failed to serialize batch")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))?;

        tracing::debug!(file = %path.display(), added = projects.len(), total = merged.len(), "saved batch");
        Ok(merged.len())
    }
}

/// First free `<file>.corrupt`, `<file>.corrupt.1`, ... next to `path`.
fn corrupt_aside_path(path: &Path) -> PathBuf {
    let first = path.with_extension("json.corrupt");
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| path.with_extension(format!("json.corrupt.{}", n)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn read_batch_file(path: &Path) -> Result<Vec<Project>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let projects: Vec<Project> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file: {}", path.display()))?;
    Ok(projects)
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

fn is_parse_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<serde_json::Error>().is_some()
}
