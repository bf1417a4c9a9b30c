//! Configuration for asymptote
//!
//! Loaded in layers, later ones winning:
//! 1. Built-in defaults
//! 2. User config (~/.config/asymptote/config.toml)
//! 3. Project config (`asymptote.toml` in the working directory)
//! 4. Environment variables (`ASYMPTOTE_ORACLE_BACKEND`,
//!    `ASYMPTOTE_ORACLE_MODEL`, `ASYMPTOTE_KB_PATH`)

use crate::cache;
use crate::oracle::{LlmBackend, LlmConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name of the project-level config.
pub const PROJECT_CONFIG_FILE: &str = "asymptote.toml";

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 64;
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["psc", "txt"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AsymptoteConfig {
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OracleSettings {
    /// "anthropic", "openai", "openrouter", "ollama" or "none"
    pub backend: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KnowledgeBaseSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnalysisSettings {
    pub workers: Option<usize>,
    pub extensions: Option<Vec<String>>,
}

impl AsymptoteConfig {
    /// Load every layer from its standard location.
    pub fn load() -> Result<Self> {
        let project = Path::new(PROJECT_CONFIG_FILE);
        let mut config = Self::load_from(Self::user_config_path().as_deref(), Some(project))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the given files; missing files are skipped.
    pub fn load_from(user: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut config = AsymptoteConfig::default();
        for path in [user, project].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let content =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let layer: AsymptoteConfig =
                toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))?;
            debug!("Loaded config layer {}", path.display());
            config.merge(layer);
        }
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("asymptote").join("config.toml"))
    }

    /// Environment overrides. `get` reads one variable.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = get("ASYMPTOTE_ORACLE_BACKEND") {
            self.oracle.backend = Some(backend);
        }
        if let Some(model) = get("ASYMPTOTE_ORACLE_MODEL") {
            self.oracle.model = Some(model);
        }
        if let Some(path) = get("ASYMPTOTE_KB_PATH") {
            self.knowledge_base.path = Some(PathBuf::from(path));
        }
        if self.oracle.backend.is_none() && get(LlmBackend::Anthropic.env_key()).is_some() {
            self.oracle.backend = Some(LlmBackend::Anthropic.name().to_string());
        }
    }

    /// Merge another config into this one (other takes priority).
    pub fn merge(&mut self, other: AsymptoteConfig) {
        let OracleSettings {
            backend,
            model,
            timeout_secs,
            max_tokens,
            temperature,
        } = other.oracle;
        if backend.is_some() {
            self.oracle.backend = backend;
        }
        if model.is_some() {
            self.oracle.model = model;
        }
        if timeout_secs.is_some() {
            self.oracle.timeout_secs = timeout_secs;
        }
        if max_tokens.is_some() {
            self.oracle.max_tokens = max_tokens;
        }
        if temperature.is_some() {
            self.oracle.temperature = temperature;
        }
        if other.knowledge_base.path.is_some() {
            self.knowledge_base.path = other.knowledge_base.path;
        }
        if other.analysis.workers.is_some() {
            self.analysis.workers = other.analysis.workers;
        }
        if other.analysis.extensions.is_some() {
            self.analysis.extensions = other.analysis.extensions;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.analysis.workers {
            if !(1..=MAX_WORKERS).contains(&workers) {
                anyhow::bail!("analysis.workers must be between 1 and {}, got {}", MAX_WORKERS, workers);
            }
        }
        self.oracle_backend()?;
        Ok(())
    }

    /// The configured backend, or `None` when the oracle is switched off.
    pub fn oracle_backend(&self) -> Result<Option<LlmBackend>> {
        match self.oracle.backend.as_deref().map(str::trim) {
            None | Some("none") | Some("") => Ok(None),
            Some(name) => name.parse::<LlmBackend>().map(Some).map_err(anyhow::Error::msg),
        }
    }

    pub fn llm_config(&self, backend: LlmBackend) -> LlmConfig {
        let defaults = LlmConfig::default();
        LlmConfig {
            backend,
            model: self.oracle.model.clone(),
            max_tokens: self.oracle.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.oracle.temperature.unwrap_or(defaults.temperature),
            timeout: self.oracle.timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout),
        }
    }

    pub fn kb_path(&self) -> PathBuf {
        self.knowledge_base
            .path
            .clone()
            .unwrap_or_else(cache::default_kb_path)
    }

    pub fn workers(&self) -> usize {
        self.analysis.workers.unwrap_or(DEFAULT_WORKERS).clamp(1, MAX_WORKERS)
    }

    pub fn extensions(&self) -> Vec<String> {
        self.analysis
            .extensions
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    /// Write a commented example project config into `dir`.
    /// Returns `None` when one already exists and `force` is off.
    pub fn init_project_config(dir: &Path, force: bool) -> Result<Option<PathBuf>> {
        let path = dir.join(PROJECT_CONFIG_FILE);
        if path.exists() && !force {
            return Ok(None);
        }
        std::fs::write(&path, EXAMPLE_CONFIG).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Some(path))
    }
}

const EXAMPLE_CONFIG: &str = r#"# asymptote configuration

[oracle]
# Backend for structures the formal rules cannot classify:
# "anthropic", "openai", "openrouter", "ollama" or "none".
# The API key comes from ANTHROPIC_API_KEY / OPENAI_API_KEY / OPENROUTER_API_KEY.
# backend = "anthropic"
# model = "claude-sonnet-4-20250514"
# timeout_secs = 30
# max_tokens = 256
# temperature = 0.0

[knowledge_base]
# Where verdicts are remembered between runs.
# path = "~/.cache/asymptote/knowledge.redb"

[analysis]
# Files analyzed in parallel (1-64).
workers = 4
# Extensions picked up when a directory is given.
extensions = ["psc", "txt"]
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AsymptoteConfig::default();
        assert_eq!(config.workers(), DEFAULT_WORKERS);
        assert_eq!(config.extensions(), vec!["psc".to_string(), "txt".to_string()]);
        assert!(config.oracle_backend().unwrap().is_none());
        assert!(config.kb_path().ends_with("knowledge.redb"));
        let llm = config.llm_config(LlmBackend::OpenAi);
        assert_eq!(llm.max_tokens, 256);
        assert_eq!(llm.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_project_layer_overrides_user_layer() {
        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("user.toml");
        let project = tmp.path().join("project.toml");
        std::fs::write(&user, "[oracle]\nbackend = \"openai\"\nmodel = \"gpt-4o\"\n[analysis]\nworkers = 8\n").unwrap();
        std::fs::write(&project, "[oracle]\nbackend = \"ollama\"\n").unwrap();

        let config = AsymptoteConfig::load_from(Some(&user), Some(&project)).unwrap();
        assert_eq!(config.oracle_backend().unwrap(), Some(LlmBackend::Ollama));
        assert_eq!(config.oracle.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.workers(), 8);
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = AsymptoteConfig::load_from(Some(&tmp.path().join("nope.toml")), None).unwrap();
        assert_eq!(config, AsymptoteConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.toml");
        std::fs::write(&bad, "this is [[ not valid toml").unwrap();
        assert!(AsymptoteConfig::load_from(None, Some(&bad)).is_err());
    }

    #[test]
    fn test_environment_wins() {
        let mut config = AsymptoteConfig::default();
        config.oracle.backend = Some("openai".into());
        config.apply_env(env(&[
            ("ASYMPTOTE_ORACLE_BACKEND", "none"),
            ("ASYMPTOTE_KB_PATH", "/tmp/kb.redb"),
        ]));
        assert!(config.oracle_backend().unwrap().is_none());
        assert_eq!(config.kb_path(), PathBuf::from("/tmp/kb.redb"));
    }

    #[test]
    fn test_anthropic_key_enables_default_backend() {
        let mut config = AsymptoteConfig::default();
        config.apply_env(env(&[("ANTHROPIC_API_KEY", "sk-test")]));
        assert_eq!(config.oracle_backend().unwrap(), Some(LlmBackend::Anthropic));
    }

    #[test]
    fn test_validation() {
        let mut config = AsymptoteConfig::default();
        config.analysis.workers = Some(0);
        assert!(config.validate().is_err());
        config.analysis.workers = Some(65);
        assert!(config.validate().is_err());
        config.analysis.workers = Some(64);
        assert!(config.validate().is_ok());
        config.oracle.backend = Some("telepathy".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_init_writes_parseable_example() {
        let tmp = TempDir::new().unwrap();
        let path = AsymptoteConfig::init_project_config(tmp.path(), false).unwrap().unwrap();
        let config = AsymptoteConfig::load_from(None, Some(&path)).unwrap();
        assert_eq!(config.workers(), 4);
        assert!(AsymptoteConfig::init_project_config(tmp.path(), false).unwrap().is_none());
        assert!(AsymptoteConfig::init_project_config(tmp.path(), true).unwrap().is_some());
    }
}
