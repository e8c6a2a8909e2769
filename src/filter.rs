use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};

/// Directory names whose contents are never archived: VCS metadata and build output.
pub const EXCLUDED_SEGMENTS: &[&str] = &[".git", "build"];

/// Case-sensitive extension allow-list. Entries keep their leading dot (`".cpp"`).
///
/// An empty set matches every file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `".cpp, .h,,.md"`.
    ///
    /// All whitespace inside an entry is removed and empty entries are dropped.
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(|s| s.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|s| !s.is_empty())
            .inspect(|ext| {
                if !ext.starts_with('.') {
                    log::warn!("Extension '{ext}' has no leading '.' and will never match (did you mean '.{ext}'?)");
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.0.contains(ext)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ExtensionSet(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "all files");
        }
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(", "))
    }
}

/// Extension of the final path segment, including the dot.
///
/// A leading dot does not start an extension, so `.gitignore` and `README`
/// have none while `notes.` has `"."`.
pub fn extension_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx..]),
    }
}

/// Returns true if any segment of `path` is a reserved directory name.
pub fn is_excluded(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(segment) => EXCLUDED_SEGMENTS
            .iter()
            .any(|reserved| segment == std::ffi::OsStr::new(reserved)),
        _ => false,
    })
}

/// Decides whether a discovered file belongs in the archive.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    extensions: ExtensionSet,
}

impl PathFilter {
    pub fn new(extensions: ExtensionSet) -> Self {
        PathFilter { extensions }
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Check a path (normally relative to the scan root) against the exclusion
    /// rules and the extension allow-list.
    pub fn matches(&self, path: &Path) -> bool {
        matches(path, &self.extensions)
    }
}

pub fn matches(path: &Path, extensions: &ExtensionSet) -> bool {
    if is_excluded(path) {
        return false;
    }

    if extensions.is_empty() {
        return true;
    }

    extension_of(path).is_some_and(|ext| extensions.contains(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[test]
    fn test_parse_trims_and_drops_empty_entries() {
        let set = ExtensionSet::parse(" .cpp, .h ,,.md,  ");
        assert_eq!(set.len(), 3);
        assert!(set.contains(".cpp"));
        assert!(set.contains(".h"));
        assert!(set.contains(".md"));
    }

    #[test]
    fn test_parse_strips_whitespace_inside_entries() {
        let set = ExtensionSet::parse(". cpp,.h\t, . m d");
        assert_eq!(set.len(), 3);
        assert!(set.contains(".cpp"));
        assert!(set.contains(".h"));
        assert!(set.contains(".md"));
    }

    #[test]
    fn test_parse_empty_string_matches_everything() {
        let set = ExtensionSet::parse("");
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "all files");
    }

    #[rstest]
    #[case("src/main.cpp", Some(".cpp"))]
    #[case("archive.tar.gz", Some(".gz"))]
    #[case("README", None)]
    #[case(".gitignore", None)]
    #[case("dir.d/Makefile", None)]
    #[case("notes.", Some("."))]
    fn test_extension_of(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(extension_of(Path::new(path)), expected);
    }

    #[rstest]
    #[case("src/a.cpp", true)]
    #[case("src/b.md", false)]
    #[case("README", false)]
    #[case("src/a.CPP", false)]
    #[case(".git/config.cpp", false)]
    #[case("lib/build/out.cpp", false)]
    #[case("builder/out.cpp", true)]
    fn test_matches_with_extension_set(#[case] path: &str, #[case] expected: bool) {
        let filter = PathFilter::new(ExtensionSet::parse(".cpp"));
        assert_eq!(filter.matches(Path::new(path)), expected, "path: {path}");
    }

    #[rstest]
    #[case("src/a.cpp", true)]
    #[case("README", true)]
    #[case(".gitignore", true)]
    #[case(".git/config", false)]
    #[case("build/app.o", false)]
    fn test_matches_with_empty_set(#[case] path: &str, #[case] expected: bool) {
        let filter = PathFilter::default();
        assert_eq!(filter.matches(&PathBuf::from(path)), expected, "path: {path}");
    }

    #[test]
    fn test_extension_set_serializes_as_list() {
        let set: ExtensionSet = [".h", ".cpp"].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[".cpp",".h"]"#);
    }
}
