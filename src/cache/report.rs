//! Outcome of a single repository pass.
//!
//! Recoverable failures never abort a pass.  They are logged where they
//! happen and collected here so callers (and tests) can see what was skipped.

use std::fmt;
use std::path::PathBuf;

/// Which step failed for a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Walk,
    Stat,
    RemovePackage,
    RemoveSignature,
}

impl fmt::Display for IssueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Walk => "walk",
            Self::Stat => "stat",
            Self::RemovePackage => "remove-package",
            Self::RemoveSignature => "remove-signature",
        })
    }
}

/// A recoverable failure tied to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassIssue {
    pub path: PathBuf,
    pub action: IssueAction,
    pub reason: String,
}

impl PassIssue {
    pub fn new(path: impl Into<PathBuf>, action: IssueAction, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            action,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for PassIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path.display(), self.reason)
    }
}

/// Summary of one scan-group-decide-delete-report cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub repo: String,
    /// Regular files seen by the scanner.
    pub scanned_files: usize,
    /// Regular files whose name is not a package artifact.
    pub ignored_files: usize,
    /// Distinct package names found.
    pub packages: usize,
    pub purged_files: usize,
    pub purged_bytes: u64,
    /// Artifacts still on disk once the pass is done.
    pub remaining_files: u64,
    pub remaining_bytes: u64,
    pub issues: Vec<PassIssue>,
}

impl PassReport {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn record_remaining(&mut self, size: u64) {
        self.remaining_files += 1;
        self.remaining_bytes = self.remaining_bytes.saturating_add(size);
    }

    pub(crate) fn record_purged(&mut self, size: u64) {
        self.purged_files += 1;
        self.purged_bytes = self.purged_bytes.saturating_add(size);
    }

    pub(crate) fn push_issue(&mut self, issue: PassIssue) {
        self.issues.push(issue);
    }
}
