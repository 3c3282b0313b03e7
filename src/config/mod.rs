//! Process-level configuration: locates the session config file,
//! applies environment overrides and hands a validated
//! `SessionConfig` to the runtime.

use anyhow::{Context, Result};
use sessionr_core::SessionConfig;
use std::env;
use std::path::{Path, PathBuf};

/// Environment-derived settings that sit outside the session config.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub store_path: PathBuf,
    pub session_config_path: PathBuf,
}

impl ProcessConfig {
    pub fn load() -> Result<Self> {
        // Load .env for local development; absence is fine.
        dotenv::dotenv().ok();

        Ok(Self {
            store_path: PathBuf::from(
                env::var("SESSIONR_STORE_PATH").unwrap_or_else(|_| "./sessionr.sqlite".to_string()),
            ),
            session_config_path: PathBuf::from(
                env::var("SESSIONR_CONFIG").unwrap_or_else(|_| "./session.json".to_string()),
            ),
        })
    }
}

/// Read, parse and validate a session config file.
pub fn load_session_config(path: &Path) -> Result<SessionConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read session config {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse session config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid session config {}", path.display()))?;
    Ok(config)
}
