//! Choosing which workspace files READ looks at, and keeping paths inside the
//! workspace.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::DiscoverySection;
use crate::errors::{IrisError, IrisResult};

/// Finds candidate files when a task declares none. Returned paths are
/// workspace-relative with `/` separators.
pub trait Discovery: Send + Sync {
    fn discover(&self, root: &Path) -> IrisResult<Vec<String>>;
}

/// Directory walk skipping hidden directories and dependency caches.
#[derive(Debug, Clone)]
pub struct WalkDiscovery {
    settings: DiscoverySection,
}

impl WalkDiscovery {
    pub fn new(settings: DiscoverySection) -> Self {
        Self { settings }
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.settings.exclude_dirs.iter().any(|d| d == name)
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.settings
                    .extensions
                    .iter()
                    .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

impl Default for WalkDiscovery {
    fn default() -> Self {
        Self::new(DiscoverySection::default())
    }
}

impl Discovery for WalkDiscovery {
    fn discover(&self, root: &Path) -> IrisResult<Vec<String>> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_excluded_dir(&entry.file_name().to_string_lossy())
            });

        let mut found = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                std::io::Error::other(format!("walking {}: {e}", root.display()))
            })?;
            if !entry.file_type().is_file() || !self.has_wanted_extension(entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                found.push(to_key(rel));
            }
        }

        found.sort();
        found.truncate(self.settings.max_files);
        debug!(count = found.len(), root = %root.display(), "discovered files");
        Ok(found)
    }
}

/// Workspace-relative key for `rel`, always `/`-separated.
pub fn to_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `file` (relative or absolute) against `root`, rejecting anything
/// that ends up outside it, either lexically or through a symlink.
///
/// `root` is expected to be canonical.
pub fn resolve_in_workspace(root: &Path, file: &str) -> IrisResult<PathBuf> {
    let outside = || IrisError::PathOutsideWorkspace {
        path: file.to_string(),
    };

    let joined = root.join(file);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(outside());
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(root) || normalized == root {
        return Err(outside());
    }

    // Symlinks may point elsewhere; check the real location when it exists.
    if let Ok(real) = normalized.canonicalize()
        && !real.starts_with(root)
    {
        return Err(outside());
    }
    Ok(normalized)
}

/// Normalized workspace key for a user-supplied path.
pub fn workspace_key(root: &Path, file: &str) -> IrisResult<String> {
    let abs = resolve_in_workspace(root, file)?;
    let rel = abs
        .strip_prefix(root)
        .map_err(|_| IrisError::PathOutsideWorkspace {
            path: file.to_string(),
        })?;
    Ok(to_key(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_discover_skips_hidden_and_dependency_dirs() {
        let (_dir, root) = workspace();
        touch(&root, "src/main.rs");
        touch(&root, "README.md");
        touch(&root, ".git/config.txt");
        touch(&root, ".context/context.json");
        touch(&root, "node_modules/pkg/index.js");
        touch(&root, "target/debug/out.rs");
        touch(&root, "pkg/__pycache__/m.py");
        touch(&root, "image.png");

        let files = WalkDiscovery::default().discover(&root).unwrap();
        assert_eq!(files, vec!["README.md".to_string(), "src/main.rs".to_string()]);
    }

    #[test]
    fn test_discover_caps_and_sorts() {
        let (_dir, root) = workspace();
        for i in 0..15 {
            touch(&root, &format!("f{i:02}.txt"));
        }
        let files = WalkDiscovery::default().discover(&root).unwrap();
        assert_eq!(files.len(), 10);
        assert_eq!(files[0], "f00.txt");
        assert_eq!(files[9], "f09.txt");
    }

    #[test]
    fn test_discover_respects_configured_extensions() {
        let (_dir, root) = workspace();
        touch(&root, "a.rs");
        touch(&root, "b.py");
        let discovery = WalkDiscovery::new(DiscoverySection {
            extensions: vec![".py".into()],
            ..DiscoverySection::default()
        });
        assert_eq!(discovery.discover(&root).unwrap(), vec!["b.py".to_string()]);
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let (_dir, root) = workspace();
        assert!(resolve_in_workspace(&root, "src/../a.txt").is_ok());
        assert!(matches!(
            resolve_in_workspace(&root, "../outside.txt"),
            Err(IrisError::PathOutsideWorkspace { .. })
        ));
        assert!(matches!(
            resolve_in_workspace(&root, "/etc/passwd"),
            Err(IrisError::PathOutsideWorkspace { .. })
        ));
        assert!(resolve_in_workspace(&root, ".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let (_dir, root) = workspace();
        let other = tempdir().unwrap();
        fs::write(other.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(other.path().join("secret.txt"), root.join("link.txt")).unwrap();
        assert!(matches!(
            resolve_in_workspace(&root, "link.txt"),
            Err(IrisError::PathOutsideWorkspace { .. })
        ));
    }

    #[test]
    fn test_workspace_key_normalizes() {
        let (_dir, root) = workspace();
        assert_eq!(workspace_key(&root, "./src/../a.txt").unwrap(), "a.txt");
        let abs = root.join("src/lib.rs");
        assert_eq!(workspace_key(&root, abs.to_str().unwrap()).unwrap(), "src/lib.rs");
    }
}
