//! Init command - write an example asymptote.toml

use crate::config::AsymptoteConfig;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the init command
pub(super) fn run(dir: &Path, force: bool) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", dir.display()))?;
    if !dir.is_dir() {
        anyhow::bail!("Path is not a directory: {}", dir.display());
    }

    match AsymptoteConfig::init_project_config(&dir, force)? {
        Some(path) => println!(
            "{} Created {}",
            style("✓").green(),
            style(path.display()).cyan()
        ),
        None => println!(
            "{} Config already exists in {} (use --force to overwrite)",
            style("✓").green(),
            style(dir.display()).cyan()
        ),
    }
    if let Some(user) = AsymptoteConfig::user_config_path() {
        println!(
            "  User-wide settings can go in {}",
            style(user.display()).dim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_config() {
        let tmp = TempDir::new().unwrap();
        run(tmp.path(), false).unwrap();
        assert!(tmp.path().join(crate::config::PROJECT_CONFIG_FILE).exists());
        run(tmp.path(), false).unwrap();
    }

    #[test]
    fn test_init_rejects_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(run(&tmp.path().join("nope"), false).is_err());
    }
}
