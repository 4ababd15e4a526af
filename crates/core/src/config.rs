//! `config.json` loading, validation, and environment-variable overrides.
//!
//! Defaults restored from the project this specification generalizes, not
//! invented here: extensions/exclude patterns/chunk-splitting knobs carry
//! their original values so an empty config directory behaves the same way
//! a freshly-initialized one would.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    Gemini,
    Openai,
}

impl EmbeddingProvider {
    fn default_model(self) -> &'static str {
        match self {
            EmbeddingProvider::Local => "BAAI/bge-base-en-v1.5",
            EmbeddingProvider::Gemini => "text-embedding-004",
            EmbeddingProvider::Openai => "text-embedding-3-small",
        }
    }

    fn default_dimensions(self) -> usize {
        match self {
            EmbeddingProvider::Local => 768,
            EmbeddingProvider::Gemini => 768,
            EmbeddingProvider::Openai => 1536,
        }
    }

    fn from_env_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(EmbeddingProvider::Local),
            "gemini" => Some(EmbeddingProvider::Gemini),
            "openai" => Some(EmbeddingProvider::Openai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub embedding_provider: EmbeddingProvider,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_chunk_max_size")]
    pub chunk_max_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for EmbeddingProvider {
    fn default() -> Self {
        EmbeddingProvider::Local
    }
}

fn default_version() -> u32 {
    1
}
fn default_embedding_model() -> String {
    EmbeddingProvider::Local.default_model().to_string()
}
fn default_embedding_dimensions() -> usize {
    EmbeddingProvider::Local.default_dimensions()
}
fn default_extensions() -> Vec<String> {
    vec![".rs".to_string()]
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "target",
        "__pycache__",
        "venv",
        ".venv",
        ".codecairn",
        "dist",
        "build",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_chunk_max_size() -> usize {
    2000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_watch_debounce_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: default_version(),
            embedding_provider: EmbeddingProvider::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            extensions: default_extensions(),
            exclude_patterns: default_exclude_patterns(),
            chunk_max_size: default_chunk_max_size(),
            chunk_overlap: default_chunk_overlap(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> CoreResult<()> {
        if self.version != 1 {
            return Err(CoreError::ConfigInvalid(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        if self.embedding_dimensions < 1 {
            return Err(CoreError::ConfigInvalid(
                "embedding_dimensions must be >= 1".into(),
            ));
        }
        if self.chunk_max_size < 100 {
            return Err(CoreError::ConfigInvalid(
                "chunk_max_size must be >= 100".into(),
            ));
        }
        if self.watch_debounce_ms < 100 {
            return Err(CoreError::ConfigInvalid(
                "watch_debounce_ms must be >= 100".into(),
            ));
        }
        for ext in &self.extensions {
            if !ext.starts_with('.') {
                return Err(CoreError::ConfigInvalid(format!(
                    "extension '{ext}' must begin with '.'"
                )));
            }
        }
        Ok(())
    }

    /// Load from `<state_dir>/config.json`, falling back to defaults if the
    /// file is absent, then apply environment overrides.
    pub fn load(state_dir: &Path) -> CoreResult<Self> {
        let path = state_dir.join("config.json");
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| CoreError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
            serde_json::from_str(&data)
                .map_err(|e| CoreError::ConfigInvalid(format!("parsing {}: {e}", path.display())))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, state_dir: &Path) -> CoreResult<()> {
        std::fs::create_dir_all(state_dir)
            .map_err(|e| CoreError::StoreError(format!("creating {}: {e}", state_dir.display())))?;
        let path = state_dir.join("config.json");
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::ConfigInvalid(e.to_string()))?;
        std::fs::write(&path, data)
            .map_err(|e| CoreError::StoreError(format!("writing {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("CODECAIRN_EMBEDDING_PROVIDER") {
            if let Some(provider) = EmbeddingProvider::from_env_str(&provider) {
                self.embedding_provider = provider;
                self.embedding_model = provider.default_model().to_string();
                self.embedding_dimensions = provider.default_dimensions();
            }
        }
        if let Ok(model) = std::env::var("CODECAIRN_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct ScopedEnvVar {
        key: &'static str,
        previous: Option<std::ffi::OsString>,
    }

    impl ScopedEnvVar {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var_os(key);
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, previous }
        }

        fn unset(key: &'static str) -> Self {
            let previous = std::env::var_os(key);
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, previous }
        }
    }

    impl Drop for ScopedEnvVar {
        fn drop(&mut self) {
            match &self.previous {
                Some(val) => unsafe {
                    std::env::set_var(self.key, val);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.extensions, vec![".rs".to_string()]);
    }

    #[test]
    fn rejects_bad_version() {
        let mut config = Config::default();
        config.version = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_extension_without_dot() {
        let mut config = Config::default();
        config.extensions = vec!["rs".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProvider::Local);
    }

    #[test]
    #[serial]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.embedding_model = "custom-model".to_string();
        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.embedding_model, "custom-model");
    }

    #[test]
    #[serial]
    fn env_override_cascades_dimensions() {
        let _provider = ScopedEnvVar::set("CODECAIRN_EMBEDDING_PROVIDER", "openai");
        let _model = ScopedEnvVar::unset("CODECAIRN_EMBEDDING_MODEL");
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProvider::Openai);
        assert_eq!(config.embedding_dimensions, 1536);
    }
}
