use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RepoLabels {
    pub repo: String,
}

impl RepoLabels {
    fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Gauges describing what each repository keeps on disk after its last pass.
pub struct Metrics {
    pub cache_packages: Family<RepoLabels, Gauge>,
    pub cache_size_bytes: Family<RepoLabels, Gauge>,
    /// Held for writing while a repo's pair of gauges is replaced and for
    /// reading while they are observed.
    publish: RwLock<()>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let cache_packages = Family::<RepoLabels, Gauge>::default();
        registry.register(
            "pkgcache_cache_packages",
            "Number of package files cached per repository",
            cache_packages.clone(),
        );

        let cache_size_bytes = Family::<RepoLabels, Gauge>::default();
        registry.register(
            "pkgcache_cache_size_bytes",
            "Total size in bytes of package files cached per repository",
            cache_size_bytes.clone(),
        );

        Self {
            cache_packages,
            cache_size_bytes,
            publish: RwLock::new(()),
        }
    }

    /// Overwrite both gauges for `repo` with the result of a completed pass.
    pub fn publish_cache_usage(&self, repo: &str, files: u64, bytes: u64) {
        let labels = RepoLabels::new(repo);
        let _guard = self.publish.write();
        self.cache_packages
            .get_or_create(&labels)
            .set(saturating_i64(files));
        self.cache_size_bytes
            .get_or_create(&labels)
            .set(saturating_i64(bytes));
    }

    /// Consistent `(files, bytes)` snapshot for `repo`.
    pub fn cache_usage(&self, repo: &str) -> (i64, i64) {
        let labels = RepoLabels::new(repo);
        let _guard = self.publish.read();
        let files = self.cache_packages.get_or_create(&labels).get();
        let bytes = self.cache_size_bytes.get_or_create(&labels).get();
        (files, bytes)
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the registry and its metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> Result<String> {
        let mut buf = String::new();
        let _guard = self.metrics.publish.read();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
