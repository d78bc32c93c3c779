//! One purge pass over a single repository.
//!
//! Scans `{cache_dir}/pkgs/{repo}`, groups artifacts by package name, applies
//! the [`RetentionPolicy`], deletes what it condemns and publishes what is
//! left to the repository's gauges.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, instrument};

use crate::metrics::Metrics;

use super::remove::{remove_artifact, PackageRemoval, RemovalOutcome};
use super::report::PassReport;
use super::retention::{group_by_package, RetentionPolicy};
use super::scan::{scan_repo, CachedFile};

/// Directory holding the cached artifacts of `repo`.
pub fn repo_cache_dir(cache_dir: &Path, repo: &str) -> PathBuf {
    cache_dir.join("pkgs").join(repo)
}

/// Run one pass for `repo` as of `now`.
///
/// Only the repo's own subtree is touched.  The gauges are set once, after
/// every group has been processed, to what remains on disk.
#[instrument(skip(cache_dir, policy, now, metrics))]
pub fn purge_repo(
    cache_dir: &Path,
    repo: &str,
    policy: &RetentionPolicy,
    now: SystemTime,
    metrics: &Metrics,
) -> PassReport {
    let root = repo_cache_dir(cache_dir, repo);
    let cutoff = policy.cutoff(now);
    if cutoff.is_none() {
        debug!("purge threshold reaches past the earliest representable time; nothing is stale");
    }
    let mut report = PassReport::new(repo);

    let mut files = Vec::new();
    for item in scan_repo(&root) {
        match item {
            Ok(file) => files.push(file),
            Err(issue) => report.push_issue(issue),
        }
    }
    report.scanned_files = files.len();

    let mut ignored = 0;
    let groups = group_by_package(repo, files, |file| {
        debug!(path = %file.path.display(), "not a package file; ignoring");
        ignored += 1;
    });
    report.ignored_files = ignored;
    report.packages = groups.len();

    for group in groups {
        for (file, verdict) in policy.judge(group, cutoff) {
            if !verdict.is_purge() {
                report.record_remaining(file.size);
                continue;
            }

            info!(
                path = %file.path.display(),
                accessed = %format_time(file.accessed),
                "removing stale file as its access time is too old"
            );
            record_removal(&mut report, &file, remove_artifact(&file.path));
        }
    }

    metrics.publish_cache_usage(repo, report.remaining_files, report.remaining_bytes);

    info!(
        scanned_files = report.scanned_files,
        ignored_files = report.ignored_files,
        packages = report.packages,
        purged_files = report.purged_files,
        purged_bytes = report.purged_bytes,
        remaining_files = report.remaining_files,
        remaining_bytes = report.remaining_bytes,
        issues = report.issues.len(),
        "purge pass finished"
    );
    report
}

/// Account for one removal attempt.  Only a package file that is still on
/// disk stays in the totals; a signature failure never changes them.
fn record_removal(report: &mut PassReport, file: &CachedFile, outcome: RemovalOutcome) {
    match outcome.package {
        PackageRemoval::Removed => report.record_purged(file.size),
        PackageRemoval::Vanished => {}
        PackageRemoval::Failed(issue) => {
            report.record_remaining(file.size);
            report.push_issue(issue);
        }
    }
    if let Some(issue) = outcome.signature {
        report.push_issue(issue);
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}
