use lookout_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. Explicit --root flag / LOOKOUT_ROOT env (handled by clap)
/// 2. Walk up from cwd looking for a .lookout/ directory
/// 3. Walk up from cwd looking for a .git/ directory
/// 4. Fall back to cwd
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    for marker in [paths::LOOKOUT_DIR, ".git"] {
        if let Some(found) = find_up(&cwd, marker) {
            return found;
        }
    }
    cwd
}

fn find_up(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(marker).is_dir() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolved = resolve_root(Some(dir.path()));
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn find_up_locates_the_marker_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".lookout")).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        // Overriding cwd isn't possible in a test process, so the walk is
        // exercised directly instead of through resolve_root.
        let found = find_up(&nested, paths::LOOKOUT_DIR).unwrap();
        assert_eq!(found, dir.path());
    }
}
