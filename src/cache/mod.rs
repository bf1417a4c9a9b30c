//! On-disk locations and source discovery
//!
//! The knowledge base lives under the user's cache directory
//! (`~/.cache/asymptote/` on Unix, `%LOCALAPPDATA%/asymptote/` on Windows)
//! unless the configuration points elsewhere.

use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the default knowledge base.
pub const KB_FILE: &str = "knowledge.redb";

/// Base cache directory for asymptote.
pub fn cache_dir() -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };
    base.join("asymptote")
}

pub fn default_kb_path() -> PathBuf {
    cache_dir().join(KB_FILE)
}

/// Make sure the directory holding `path` exists.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Expand the given paths into source files.
///
/// Files are taken as given whatever their extension. Directories are
/// walked honouring `.gitignore`, keeping files with one of `extensions`.
/// The result is sorted and free of duplicates.
pub fn discover_sources(paths: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_file() {
            out.push(path.clone());
            continue;
        }
        let walker = ignore::WalkBuilder::new(path).hidden(false).git_ignore(true).build();
        let before = out.len();
        out.extend(
            walker
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
                        .unwrap_or(false)
                })
                .map(|e| e.path().to_path_buf()),
        );
        debug!("Found {} sources under {}", out.len() - before, path.display());
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_kb_path() {
        let path = default_kb_path();
        assert!(path.ends_with("asymptote/knowledge.redb"));
    }

    #[test]
    fn test_discovery_filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("a.psc"), "").unwrap();
        std::fs::write(tmp.path().join("nested/b.PSC"), "").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "").unwrap();
        let explicit = tmp.path().join("notes.md");

        let found = discover_sources(
            &[tmp.path().to_path_buf(), explicit.clone()],
            &["psc".to_string()],
        );
        assert_eq!(found.len(), 3);
        assert!(found.contains(&explicit));
        assert!(found.iter().any(|p| p.ends_with("nested/b.PSC")));
    }

    #[test]
    fn test_ensure_parent_dir() {
        let tmp = TempDir::new().unwrap();
        let kb = tmp.path().join("deep/er/kb.redb");
        ensure_parent_dir(&kb).unwrap();
        assert!(tmp.path().join("deep/er").is_dir());
        ensure_parent_dir(Path::new("kb.redb")).unwrap();
    }
}
