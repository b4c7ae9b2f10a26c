//! System config loader (strict parsing).

pub mod schema;

use std::fs;

use endocrine_core::error::{EndocrineError, Result};

pub use schema::{BackendSection, BrokerSection, StatsSection, SystemConfig, TlsSection};

pub fn load_from_file(path: &str) -> Result<SystemConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| EndocrineError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<SystemConfig> {
    let cfg: SystemConfig = serde_yaml::from_str(s)
        .map_err(|e| EndocrineError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
