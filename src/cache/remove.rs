//! Deletion of a purged artifact and its detached signature.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::report::{IssueAction, PassIssue};

/// Suffix appended to an artifact path to get its detached signature.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Path of the detached signature that accompanies `package`.
pub fn signature_path(package: &Path) -> PathBuf {
    let mut path = OsString::from(package.as_os_str());
    path.push(SIGNATURE_SUFFIX);
    PathBuf::from(path)
}

/// What happened to the package file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRemoval {
    Removed,
    /// Already gone, most likely removed concurrently by someone else.
    Vanished,
    Failed(PassIssue),
}

/// Result of removing one artifact.  Both deletions are always attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub package: PackageRemoval,
    /// Set when the signature exists but could not be deleted.
    pub signature: Option<PassIssue>,
}

/// Delete `package` and `package.sig`.  Failures are logged and returned,
/// never propagated.
pub fn remove_artifact(package: &Path) -> RemovalOutcome {
    let package_outcome = match std::fs::remove_file(package) {
        Ok(()) => PackageRemoval::Removed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %package.display(), "stale file already removed");
            PackageRemoval::Vanished
        }
        Err(e) => {
            warn!(path = %package.display(), error = %e, "failed to remove stale file");
            PackageRemoval::Failed(PassIssue::new(package, IssueAction::RemovePackage, e))
        }
    };

    let signature = signature_path(package);
    let signature_outcome = match std::fs::remove_file(&signature) {
        Ok(()) => None,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %signature.display(), "no signature file to remove");
            None
        }
        Err(e) => {
            warn!(path = %signature.display(), error = %e, "failed to remove signature file");
            Some(PassIssue::new(signature, IssueAction::RemoveSignature, e))
        }
    };

    RemovalOutcome {
        package: package_outcome,
        signature: signature_outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_path_appends_suffix() {
        assert_eq!(
            signature_path(Path::new("/c/pkgs/core/a-1-1-any.pkg.tar.zst")),
            PathBuf::from("/c/pkgs/core/a-1-1-any.pkg.tar.zst.sig")
        );
    }

    #[test]
    fn removes_package_and_signature() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("a-1-1-any.pkg.tar.zst");
        std::fs::write(&pkg, "pkg").unwrap();
        std::fs::write(signature_path(&pkg), "sig").unwrap();

        let outcome = remove_artifact(&pkg);
        assert_eq!(outcome.package, PackageRemoval::Removed);
        assert!(outcome.signature.is_none());
        assert!(!pkg.exists());
        assert!(!signature_path(&pkg).exists());
    }

    #[test]
    fn missing_signature_is_not_an_issue() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("a-1-1-any.pkg.tar.zst");
        std::fs::write(&pkg, "pkg").unwrap();

        let outcome = remove_artifact(&pkg);
        assert_eq!(outcome.package, PackageRemoval::Removed);
        assert!(outcome.signature.is_none());
    }

    #[test]
    fn vanished_package_counts_as_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("a-1-1-any.pkg.tar.zst");
        std::fs::write(signature_path(&pkg), "sig").unwrap();

        let outcome = remove_artifact(&pkg);
        assert_eq!(outcome.package, PackageRemoval::Vanished);
        assert!(!signature_path(&pkg).exists());
    }

    #[test]
    fn failed_removal_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory cannot be removed with remove_file.
        let pkg = tmp.path().join("a-1-1-any.pkg.tar.zst");
        std::fs::create_dir(&pkg).unwrap();

        let outcome = remove_artifact(&pkg);
        match outcome.package {
            PackageRemoval::Failed(issue) => {
                assert_eq!(issue.action, IssueAction::RemovePackage);
                assert_eq!(issue.path, pkg);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(pkg.exists());
    }
}
