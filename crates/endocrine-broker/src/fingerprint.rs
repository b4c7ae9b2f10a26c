//! CA fingerprint seam.

use async_trait::async_trait;

use endocrine_core::error::Result;

#[async_trait]
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint of the CA certificate bytes; fails on malformed input.
    async fn fingerprint(&self, ca: &[u8]) -> Result<String>;
}

/// SHA-256 over the DER certificate, lowercase colon-separated hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

#[async_trait]
impl Fingerprinter for Sha256Fingerprinter {
    async fn fingerprint(&self, ca: &[u8]) -> Result<String> {
        endocrine_core::ca_fingerprint(ca)
    }
}
