//! Purge scheduler.
//!
//! Sweeps every configured repository once at startup, then once per
//! [`SWEEP_INTERVAL`] for the lifetime of the process.  Repositories are
//! processed one at a time on a blocking thread so filesystem work never
//! stalls the runtime and two sweeps never overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{purge_repo, PassReport, RetentionPolicy};
use crate::config::Config;
use crate::metrics::MetricsRegistry;

/// Time between two sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RepoJob {
    repo: String,
    policy: RetentionPolicy,
}

/// Runs one purge pass per configured repository.
#[derive(Clone)]
pub struct Sweeper {
    cache_dir: PathBuf,
    jobs: Arc<Vec<RepoJob>>,
    metrics: MetricsRegistry,
}

impl Sweeper {
    /// Build the per-repo retention policies.  Fails if any repo would end up
    /// with a zero age threshold, before a single file is touched.
    pub fn from_config(config: &Config, metrics: MetricsRegistry) -> Result<Self> {
        let jobs = config
            .repos
            .keys()
            .map(|repo| {
                let policy =
                    RetentionPolicy::new(config.purge_files_after(repo), config.keep_files(repo))?;
                info!(
                    repo = %repo,
                    purge_files_after_secs = policy.purge_files_after().as_secs(),
                    keep_files = policy.keep(),
                    "purge policy configured"
                );
                Ok(RepoJob {
                    repo: repo.clone(),
                    policy,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cache_dir: config.cache_dir.clone(),
            jobs: Arc::new(jobs),
            metrics,
        })
    }

    /// Purge every repository in turn.  Blocks on filesystem I/O.
    pub fn sweep(&self) -> Vec<PassReport> {
        self.jobs
            .iter()
            .map(|job| {
                purge_repo(
                    &self.cache_dir,
                    &job.repo,
                    &job.policy,
                    SystemTime::now(),
                    &self.metrics.metrics,
                )
            })
            .collect()
    }

    /// Run [`Sweeper::sweep`] on the blocking pool.
    pub async fn sweep_blocking(&self) -> Result<Vec<PassReport>> {
        let sweeper = self.clone();
        let reports = tokio::task::spawn_blocking(move || sweeper.sweep()).await?;
        Ok(reports)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    StartupSweep,
    SteadyState,
}

/// Handle to the background sweep loop.  Dropping it leaves the loop running;
/// call [`PurgeScheduler::stop`] to shut it down.
pub struct PurgeScheduler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl PurgeScheduler {
    /// Spawn the loop.  The startup sweep begins immediately.
    pub fn start(sweeper: Sweeper, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(sweeper, period, shutdown.clone()));
        Self { shutdown, handle }
    }

    /// Stop waiting for ticks and wait for the loop to exit.  A sweep that is
    /// already running is allowed to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "purge scheduler task failed");
        }
        info!("purge scheduler stopped");
    }
}

async fn run(sweeper: Sweeper, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = SchedulerState::StartupSweep;
    info!(period_secs = period.as_secs(), "purge scheduler started");

    loop {
        match state {
            SchedulerState::StartupSweep => {
                sweep_once(&sweeper).await;
                state = SchedulerState::SteadyState;
            }
            SchedulerState::SteadyState => {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => sweep_once(&sweeper).await,
                }
            }
        }
    }
}

async fn sweep_once(sweeper: &Sweeper) {
    match sweeper.sweep_blocking().await {
        Ok(reports) => {
            let purged: usize = reports.iter().map(|r| r.purged_files).sum();
            let issues: usize = reports.iter().map(|r| r.issues.len()).sum();
            for issue in reports.iter().flat_map(|r| &r.issues) {
                debug!(%issue, "recoverable issue during sweep");
            }
            info!(repos = reports.len(), purged, issues, "purge sweep finished");
        }
        Err(e) => error!(error = %e, "purge sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    use filetime::{set_file_times, FileTime};

    use crate::cache::purge::repo_cache_dir;
    use crate::config::RepoConfig;

    const THIRTY_DAYS: u64 = 3600 * 24 * 30;

    fn config(cache_dir: &Path, repos: &[(&str, RepoConfig)]) -> Config {
        Config {
            cache_dir: cache_dir.to_path_buf(),
            purge_files_after: THIRTY_DAYS,
            keep_files: 0,
            repos: repos
                .iter()
                .map(|(name, settings)| (name.to_string(), settings.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn stale_file(cache_dir: &Path, repo: &str, name: &str) -> PathBuf {
        let dir = repo_cache_dir(cache_dir, repo);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, "stale").unwrap();
        let old = FileTime::from_unix_time(1_000_000, 0);
        set_file_times(&path, old, old).unwrap();
        path
    }

    async fn wait_until_gone(path: &Path) -> bool {
        for _ in 0..200 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn zero_override_fails_before_any_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = stale_file(tmp.path(), "core", "a-1-1-any.pkg.tar.zst");
        let cfg = config(
            tmp.path(),
            &[(
                "core",
                RepoConfig {
                    purge_files_after: Some(0),
                    keep_files: None,
                },
            )],
        );

        assert!(Sweeper::from_config(&cfg, MetricsRegistry::new()).is_err());
        assert!(pkg.exists());
    }

    #[test]
    fn sweep_runs_every_repo_with_its_own_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let core = stale_file(tmp.path(), "core", "a-1-1-any.pkg.tar.zst");
        let extra = stale_file(tmp.path(), "extra", "b-1-1-any.pkg.tar.zst");
        let cfg = config(
            tmp.path(),
            &[
                ("core", RepoConfig::default()),
                (
                    "extra",
                    RepoConfig {
                        purge_files_after: None,
                        keep_files: Some(1),
                    },
                ),
                ("empty", RepoConfig::default()),
            ],
        );
        let metrics = MetricsRegistry::new();
        let sweeper = Sweeper::from_config(&cfg, metrics.clone()).unwrap();

        let reports = sweeper.sweep();

        let repos: Vec<_> = reports.iter().map(|r| r.repo.as_str()).collect();
        assert_eq!(repos, vec!["core", "empty", "extra"]);
        assert!(!core.exists());
        assert!(extra.exists());
        assert_eq!(metrics.metrics.cache_usage("core"), (0, 0));
        assert_eq!(metrics.metrics.cache_usage("extra"), (1, 5));
        assert_eq!(metrics.metrics.cache_usage("empty"), (0, 0));
    }

    #[tokio::test]
    async fn startup_sweep_runs_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = stale_file(tmp.path(), "core", "a-1-1-any.pkg.tar.zst");
        let cfg = config(tmp.path(), &[("core", RepoConfig::default())]);
        let sweeper = Sweeper::from_config(&cfg, MetricsRegistry::new()).unwrap();

        let scheduler = PurgeScheduler::start(sweeper, SWEEP_INTERVAL);

        assert!(wait_until_gone(&pkg).await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn steady_state_sweeps_on_each_tick() {
        let tmp = tempfile::tempdir().unwrap();
        let first = stale_file(tmp.path(), "core", "a-1-1-any.pkg.tar.zst");
        let cfg = config(tmp.path(), &[("core", RepoConfig::default())]);
        let sweeper = Sweeper::from_config(&cfg, MetricsRegistry::new()).unwrap();

        let scheduler = PurgeScheduler::start(sweeper, Duration::from_millis(100));
        assert!(wait_until_gone(&first).await);

        let second = stale_file(tmp.path(), "core", "b-1-1-any.pkg.tar.zst");
        assert!(wait_until_gone(&second).await);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_returns_while_waiting_for_tick() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("core", RepoConfig::default())]);
        let sweeper = Sweeper::from_config(&cfg, MetricsRegistry::new()).unwrap();

        let scheduler = PurgeScheduler::start(sweeper, SWEEP_INTERVAL);
        tokio::time::timeout(Duration::from_secs(5), scheduler.stop())
            .await
            .expect("scheduler did not stop");
    }
}
