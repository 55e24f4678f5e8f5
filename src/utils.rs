// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for ragdex

use std::path::{Path, PathBuf};

/// Default snapshot location, relative to the working directory
pub const DEFAULT_SNAPSHOT_PATH: &str = ".ragdex/snapshot.sqlite";

/// Find an existing snapshot at `relative` by walking up from `start`.
/// Returns None if no ancestor holds one.
pub fn find_snapshot(start: impl AsRef<Path>, relative: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        let candidate = current.join(relative.as_ref());
        if candidate.is_file() {
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Resolve the snapshot path used by the CLI.
///
/// Absolute paths are returned unchanged. Relative paths resolve to the
/// nearest existing snapshot in `start` or a parent, falling back to
/// `start.join(relative)` so a first build lands in the working directory.
pub fn resolve_snapshot_path(start: impl AsRef<Path>, snapshot: impl AsRef<Path>) -> PathBuf {
    let snapshot = snapshot.as_ref();
    if snapshot.is_absolute() {
        return snapshot.to_path_buf();
    }
    find_snapshot(&start, snapshot).unwrap_or_else(|| start.as_ref().join(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch_snapshot(root: &Path) -> PathBuf {
        let path = root.join(DEFAULT_SNAPSHOT_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn find_snapshot_in_current_dir() {
        let dir = TempDir::new().unwrap();
        touch_snapshot(dir.path());

        let found = find_snapshot(dir.path(), DEFAULT_SNAPSHOT_PATH).unwrap();
        assert_eq!(
            found,
            dir.path().canonicalize().unwrap().join(DEFAULT_SNAPSHOT_PATH)
        );
    }

    #[test]
    fn find_snapshot_in_parent() {
        let dir = TempDir::new().unwrap();
        touch_snapshot(dir.path());

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let found = find_snapshot(&subdir, DEFAULT_SNAPSHOT_PATH).unwrap();
        assert!(found.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn find_snapshot_none() {
        let dir = TempDir::new().unwrap();
        assert!(find_snapshot(dir.path(), DEFAULT_SNAPSHOT_PATH).is_none());
    }

    #[test]
    fn resolve_snapshot_path_fallback() {
        let dir = TempDir::new().unwrap();
        let path = resolve_snapshot_path(dir.path(), DEFAULT_SNAPSHOT_PATH);
        assert_eq!(path, dir.path().join(DEFAULT_SNAPSHOT_PATH));
    }

    #[test]
    fn resolve_snapshot_path_keeps_absolute() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("elsewhere.sqlite");
        assert_eq!(resolve_snapshot_path("/", &absolute), absolute);
    }
}
