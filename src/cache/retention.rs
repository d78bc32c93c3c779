//! Per-package grouping and the keep-or-purge decision.
//!
//! Every package keeps its `keep` most recently modified files no matter how
//! old they are.  Anything older than that tail is purged once its last
//! access falls strictly before `now - purge_files_after`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::trace;

use super::artifact::PackageFileName;
use super::scan::CachedFile;

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// All cached variants of one package name within one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageGroup {
    pub name: String,
    pub repo: String,
    pub files: Vec<CachedFile>,
}

/// Buckets scanned files by package name.  Files that are not package
/// artifacts are handed back to the caller through `on_ignored`.
pub fn group_by_package<I, F>(repo: &str, files: I, mut on_ignored: F) -> Vec<PackageGroup>
where
    I: IntoIterator<Item = CachedFile>,
    F: FnMut(&CachedFile),
{
    let mut groups: HashMap<String, PackageGroup> = HashMap::new();

    for file in files {
        let Some(parsed) = file.file_name().and_then(PackageFileName::parse) else {
            on_ignored(&file);
            continue;
        };
        trace!(
            package = parsed.name,
            version = parsed.version,
            release = parsed.release,
            arch = parsed.arch,
            "classified package file"
        );
        let name = parsed.name;
        if let Some(group) = groups.get_mut(name) {
            group.files.push(file);
            continue;
        }
        let name = name.to_string();
        groups.insert(
            name.clone(),
            PackageGroup {
                name,
                repo: repo.to_string(),
                files: vec![file],
            },
        );
    }

    let mut groups: Vec<PackageGroup> = groups.into_values().collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Why a file survives or goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Among the `keep` most recently modified files of its package.
    KeptByFloor,
    /// Old enough to be a candidate, but accessed recently.
    KeptByAccess,
    Purge,
}

impl Retention {
    pub fn is_purge(self) -> bool {
        self == Self::Purge
    }
}

/// Count floor plus access-age ceiling applied to every package group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    purge_files_after: Duration,
    keep: usize,
}

impl RetentionPolicy {
    /// Fails if `purge_files_after` is zero: every file would be stale at
    /// once and a single pass would wipe the cache.
    pub fn new(purge_files_after: Duration, keep: usize) -> Result<Self> {
        anyhow::ensure!(
            !purge_files_after.is_zero(),
            "purge_files_after=0 would purge the whole cache"
        );
        Ok(Self {
            purge_files_after,
            keep,
        })
    }

    pub fn purge_files_after(&self) -> Duration {
        self.purge_files_after
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Files last accessed strictly before this instant are stale.
    ///
    /// `None` when the instant cannot be represented: no file can be older,
    /// so nothing is stale.
    pub fn cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        now.checked_sub(self.purge_files_after)
    }

    /// Sort `group` oldest-modified first and judge each file against
    /// `cutoff`.  Without a cutoff every file is kept.
    pub fn judge(
        &self,
        group: PackageGroup,
        cutoff: Option<SystemTime>,
    ) -> Vec<(CachedFile, Retention)> {
        trace!(
            repo = %group.repo,
            package = %group.name,
            files = group.files.len(),
            "judging package group"
        );
        let mut files = group.files;
        files.sort_by_key(|f| f.modified);

        let protected_from = files.len().saturating_sub(self.keep);
        files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let verdict = if index >= protected_from {
                    Retention::KeptByFloor
                } else if cutoff.is_some_and(|cutoff| file.accessed < cutoff) {
                    Retention::Purge
                } else {
                    Retention::KeptByAccess
                };
                (file, verdict)
            })
            .collect()
    }
}
