use serde::Deserialize;
use endocrine_core::error::{EndocrineError, Result};

/// Root of the YAML configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    pub version: u32,

    #[serde(default)]
    pub broker: BrokerSection,

    pub tls: TlsSection,

    pub backend: BackendSection,

    #[serde(default)]
    pub stats: StatsSection,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(EndocrineError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.broker.validate()?;
        self.tls.validate()?;
        self.backend.validate()?;
        self.stats.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(EndocrineError::Config("broker.port must not be 0".into()));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    8883
}

/// TLS material. The listener always requests and requires a client
/// certificate signed by `ca_path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
}

impl TlsSection {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("tls.cert_path", &self.cert_path),
            ("tls.key_path", &self.key_path),
            ("tls.ca_path", &self.ca_path),
        ] {
            if value.trim().is_empty() {
                return Err(EndocrineError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    pub url: String,

    #[serde(default = "default_pubsub_collection")]
    pub pubsub_collection: String,
}

impl BackendSection {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(EndocrineError::Config("backend.url must not be empty".into()));
        }
        if self.pubsub_collection.trim().is_empty() {
            return Err(EndocrineError::Config(
                "backend.pubsub_collection must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_pubsub_collection() -> String {
    "ascoltatori".into()
}

/// Periodic traffic stats. `interval_ms: 0` disables the reporter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsSection {
    #[serde(default)]
    pub interval_ms: u64,
}

impl StatsSection {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms != 0 && self.interval_ms < 1000 {
            return Err(EndocrineError::Config(
                "stats.interval_ms must be 0 (off) or at least 1000".into(),
            ));
        }
        Ok(())
    }
}
