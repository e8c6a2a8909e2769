use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ArchiveError, Result};
use crate::filter::{is_excluded, ExtensionSet, PathFilter};

/// A file skipped during scanning or archiving, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// The files matched by one scan, sorted by path.
///
/// Entries are absolute or root-relative exactly as produced by joining the
/// scan root, so they can be re-rooted with [`Manifest::relative_path`].
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    root: PathBuf,
    files: Vec<PathBuf>,
    skipped: Vec<Skipped>,
}

impl Manifest {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Entries the walk could not read.
    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of `file` relative to the scan root.
    pub fn relative_path<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.root).unwrap_or(file)
    }

    pub fn relative_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| self.relative_path(f))
    }
}

/// Recursive walker over one scan root.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    excluded_dirs: Vec<PathBuf>,
}

impl Scanner {
    /// Fails with [`ArchiveError::NotFound`] unless `root` is an existing directory right now.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ArchiveError::NotFound { path: root });
        }
        Ok(Scanner {
            root,
            excluded_dirs: Vec::new(),
        })
    }

    /// Never descend into `dir`. Used to keep the archive destination out of
    /// its own manifest when it lives under the scan root.
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        if let Ok(canonical) = dir.canonicalize() {
            self.excluded_dirs.push(canonical);
        }
        self
    }

    fn is_excluded_dir(&self, dir: &Path) -> bool {
        !self.excluded_dirs.is_empty()
            && dir
                .canonicalize()
                .is_ok_and(|canonical| self.excluded_dirs.contains(&canonical))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and collect every regular file accepted by the filter.
    ///
    /// Symlinks and special files are skipped. Unreadable entries are logged
    /// and recorded on the manifest; they never abort the walk.
    pub fn scan(&self, extensions: &ExtensionSet) -> Manifest {
        let filter = PathFilter::new(extensions.clone());
        let mut files = Vec::new();
        let mut skipped = Vec::new();

        log::info!("Scanning workshop files under {}", self.root.display());

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !(is_excluded(Path::new(entry.file_name()))
                        || self.is_excluded_dir(entry.path()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    log::warn!("Error scanning {}: {}", path.display(), e);
                    skipped.push(Skipped {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if filter.matches(relative) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        log::info!("Found {} files", files.len());

        Manifest {
            root: self.root.clone(),
            files,
            skipped,
        }
    }
}

/// Convenience wrapper: create a [`Scanner`] for `root` and run one scan.
pub fn scan(root: &Path, extensions: &ExtensionSet) -> Result<Manifest> {
    Ok(Scanner::new(root)?.scan(extensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workshop() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("build/obj")).unwrap();
        fs::write(root.join("src/a.cpp"), "int main() {}").unwrap();
        fs::write(root.join("src/b.md"), "# notes").unwrap();
        fs::write(root.join("README"), "readme").unwrap();
        fs::write(root.join(".git/config"), "[core]").unwrap();
        fs::write(root.join("build/obj/a.cpp"), "generated").unwrap();
        temp
    }

    fn relative(manifest: &Manifest) -> Vec<String> {
        manifest
            .relative_paths()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = Scanner::new(&missing).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let temp = workshop();
        let err = Scanner::new(temp.path().join("README")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp = workshop();
        let locked = temp.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.cpp"), "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores directory permissions, so there is nothing to observe.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("Skipping: directory permissions are not enforced");
            return;
        }

        let manifest = scan(temp.path(), &ExtensionSet::new()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(relative(&manifest), vec!["README", "src/a.cpp", "src/b.md"]);
        assert_eq!(manifest.skipped().len(), 1);
        assert_eq!(manifest.skipped()[0].path, locked);
    }

    #[test]
    fn test_scan_with_extension_set() {
        let temp = workshop();
        let manifest = scan(temp.path(), &ExtensionSet::parse(".cpp")).unwrap();
        assert_eq!(relative(&manifest), vec!["src/a.cpp"]);
    }

    #[test]
    fn test_scan_all_files_skips_reserved_dirs() {
        let temp = workshop();
        let manifest = scan(temp.path(), &ExtensionSet::new()).unwrap();
        assert_eq!(relative(&manifest), vec!["README", "src/a.cpp", "src/b.md"]);
        assert!(manifest.skipped().is_empty());
    }

    #[test]
    fn test_scan_root_inside_reserved_name_still_scans() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("build");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.cpp"), "x").unwrap();

        let manifest = scan(&root, &ExtensionSet::new()).unwrap();
        assert_eq!(relative(&manifest), vec!["main.cpp"]);
    }

    #[test]
    fn test_excluded_dir_is_not_scanned() {
        let temp = workshop();
        let archive = temp.path().join("workshop-archive");
        fs::create_dir_all(archive.join("src")).unwrap();
        fs::write(archive.join("src/a.cpp"), "old copy").unwrap();

        let manifest = Scanner::new(temp.path())
            .unwrap()
            .exclude_dir(&archive)
            .scan(&ExtensionSet::parse(".cpp"));
        assert_eq!(relative(&manifest), vec!["src/a.cpp"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let temp = workshop();
        std::os::unix::fs::symlink(temp.path().join("README"), temp.path().join("link.cpp"))
            .unwrap();
        let manifest = scan(temp.path(), &ExtensionSet::parse(".cpp")).unwrap();
        assert_eq!(relative(&manifest), vec!["src/a.cpp"]);
    }
}
