//! Stale package eviction for the on-disk package cache.
//!
//! Artifacts are stored under `{cache_dir}/pkgs/{repo}/`.  A pass walks one
//! repo's directory, groups artifacts by package name, keeps the newest
//! `keep_files` of each package and deletes the rest once they have not been
//! accessed for `purge_files_after` seconds.

pub mod artifact;
pub mod purge;
pub mod remove;
pub mod report;
pub mod retention;
pub mod scan;

pub use purge::purge_repo;
pub use report::PassReport;
pub use retention::RetentionPolicy;
