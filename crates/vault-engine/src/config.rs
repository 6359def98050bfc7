use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a vault search engine instance. Generalizes
/// the validate/from_file/Default pattern this codebase uses for its config
/// types to the vault-search domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub vault_path: PathBuf,
    pub storage_dir: PathBuf,
    pub default_profile: String,
    pub chunking: crate::chunker::ChunkingConfig,
    pub max_chunks_per_file: usize,
    pub query_timeout_ms: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.vault_path.as_os_str().is_empty() {
            return Err("vault_path must not be empty".into());
        }
        if self.max_chunks_per_file == 0 {
            return Err("max_chunks_per_file must be > 0".into());
        }
        self.chunking
            .validate()
            .map_err(|e| format!("chunking config invalid: {e}"))?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {e}"))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let storage_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vault-engine");
        Self {
            vault_path: PathBuf::from("."),
            storage_dir,
            default_profile: "default".to_string(),
            chunking: crate::chunker::ChunkingConfig::default(),
            max_chunks_per_file: crate::pipeline::DEFAULT_MAX_CHUNKS_PER_FILE,
            query_timeout_ms: crate::pipeline::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig {
            vault_path: PathBuf::from("/vaults/demo"),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_vault_path_is_rejected() {
        let config = EngineConfig {
            vault_path: PathBuf::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
