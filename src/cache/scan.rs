//! Recursive walk of one repository's cache directory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::report::{IssueAction, PassIssue};

/// One regular file found on disk during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub size: u64,
}

impl CachedFile {
    /// File name component as UTF-8, if it has one.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Lazily walk `root` and yield every regular file below it.
///
/// Symlinks are not followed and are skipped along with directories and
/// special files.  A missing `root` yields nothing: a repository that has
/// never cached a package has no directory yet.  Any other walk or stat
/// failure is yielded as a [`PassIssue`] and the walk carries on with the
/// remaining entries.
pub fn scan_repo(root: &Path) -> impl Iterator<Item = Result<CachedFile, PassIssue>> {
    let root = root.to_path_buf();
    WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let missing_root = err.depth() == 0
                        && err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound);
                    if missing_root {
                        debug!(path = %root.display(), "repo cache directory does not exist yet");
                        return None;
                    }
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    warn!(path = %path.display(), error = %err, "failed to walk cache directory");
                    return Some(Err(PassIssue::new(path, IssueAction::Walk, err)));
                }
            };

            if !entry.file_type().is_file() {
                return None;
            }

            stat(&entry)
        })
}

/// `None` when the file disappeared between listing and stat.
fn stat(entry: &DirEntry) -> Option<Result<CachedFile, PassIssue>> {
    let path = entry.path();
    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(err) if err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
            debug!(path = %path.display(), "cached file vanished during scan");
            return None;
        }
        Err(err) => return Some(Err(stat_failed(path, err))),
    };
    let times = metadata
        .modified()
        .and_then(|modified| Ok((modified, metadata.accessed()?)));
    Some(match times {
        Ok((modified, accessed)) => Ok(CachedFile {
            path: path.to_path_buf(),
            modified,
            accessed,
            size: metadata.len(),
        }),
        Err(err) => Err(stat_failed(path, err)),
    })
}

fn stat_failed(path: &Path, err: impl std::fmt::Display) -> PassIssue {
    warn!(path = %path.display(), error = %err, "failed to stat cached file");
    PassIssue::new(path, IssueAction::Stat, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_times, FileTime};

    fn collect(root: &Path) -> (Vec<CachedFile>, Vec<PassIssue>) {
        let mut files = Vec::new();
        let mut issues = Vec::new();
        for item in scan_repo(root) {
            match item {
                Ok(file) => files.push(file),
                Err(issue) => issues.push(issue),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        (files, issues)
    }

    #[test]
    fn missing_root_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (files, issues) = collect(&tmp.path().join("pkgs").join("nope"));
        assert!(files.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn finds_nested_regular_files_with_times() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("os").join("x86_64");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("a-1-1-any.pkg.tar.zst"), "aaa").unwrap();
        std::fs::write(nested.join("b-1-1-any.pkg.tar.zst"), "bbbbb").unwrap();

        let atime = FileTime::from_unix_time(1_000_000, 0);
        let mtime = FileTime::from_unix_time(2_000_000, 0);
        set_file_times(tmp.path().join("a-1-1-any.pkg.tar.zst"), atime, mtime).unwrap();

        let (files, issues) = collect(tmp.path());
        assert!(issues.is_empty());
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].file_name(), Some("a-1-1-any.pkg.tar.zst"));
        assert_eq!(files[0].size, 3);
        assert_eq!(FileTime::from_system_time(files[0].accessed), atime);
        assert_eq!(FileTime::from_system_time(files[0].modified), mtime);

        assert_eq!(files[1].path, nested.join("b-1-1-any.pkg.tar.zst"));
        assert_eq!(files[1].size, 5);
    }

    #[test]
    fn file_removed_mid_walk_is_skipped_quietly() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a-1-1-any.pkg.tar.zst");
        let second = tmp.path().join("b-1-1-any.pkg.tar.zst");
        std::fs::write(&first, "a").unwrap();
        std::fs::write(&second, "b").unwrap();

        // Entries are listed in name order before the first one is stat'ed.
        let mut walk = scan_repo(tmp.path());
        let found = walk.next().unwrap().unwrap();
        assert_eq!(found.path, first);

        std::fs::remove_file(&second).unwrap();
        assert!(walk.next().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("real-1-1-any.pkg.tar.zst");
        std::fs::write(&target, "x").unwrap();
        std::os::unix::fs::symlink(&target, tmp.path().join("link-1-1-any.pkg.tar.zst")).unwrap();

        let (files, _) = collect(tmp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, target);
    }
}
