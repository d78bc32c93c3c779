//! Package artifact file names.
//!
//! Cached packages are named `{name}-{version}-{release}-{arch}.pkg.tar.{zst,xz}`.
//! Because package names may themselves contain dashes and digits, the split
//! is resolved the way the regex engine resolves it: the name is matched
//! greedily and gives back only as much as version, release and
//! architecture need.

use once_cell::sync::Lazy;
use regex::Regex;

static PACKAGE_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[a-zA-Z0-9_+\-]+)-(?P<version>[0-9.:a-zA-Z+]+)-(?P<release>[0-9]+)-(?P<arch>[a-zA-Z0-9_]+)\.pkg\.tar\.(?:zst|xz)$",
    )
    .expect("package file pattern is valid")
});

/// Components of a package artifact file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageFileName<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub release: &'a str,
    pub arch: &'a str,
}

impl<'a> PackageFileName<'a> {
    /// Parse a bare file name (no directory part).
    ///
    /// Returns `None` for anything that is not a package artifact, such as
    /// repository databases or detached signatures.
    pub fn parse(file_name: &'a str) -> Option<Self> {
        let caps = PACKAGE_FILE_RE.captures(file_name)?;
        Some(Self {
            name: caps.name("name")?.as_str(),
            version: caps.name("version")?.as_str(),
            release: caps.name("release")?.as_str(),
            arch: caps.name("arch")?.as_str(),
        })
    }
}
