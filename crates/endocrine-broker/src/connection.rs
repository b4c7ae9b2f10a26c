//! Client connection record and its certificate cache.
//!
//! The engine owns one `ClientConnection` per transport connection and hands
//! `Arc`s of it to the hooks. The gate only touches the certificate slot.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use endocrine_core::error::Result;
use endocrine_core::{PeerCertificate, RawPeerCertificate};

/// Transport-side access to the TLS peer certificate.
pub trait PeerTransport: Send + Sync {
    /// `Ok(None)` when the peer presented no certificate.
    fn peer_certificate(&self) -> Result<Option<RawPeerCertificate>>;
}

/// Transport with a fixed certificate (or none). Used by engines that
/// extract the certificate during the handshake.
#[derive(Debug, Clone, Default)]
pub struct StaticPeer(pub Option<RawPeerCertificate>);

impl PeerTransport for StaticPeer {
    fn peer_certificate(&self) -> Result<Option<RawPeerCertificate>> {
        Ok(self.0.clone())
    }
}

pub struct ClientConnection {
    id: String,
    remote_ip: IpAddr,
    remote_port: u16,
    transport: Arc<dyn PeerTransport>,
    // Filled on first access, `None` records absence.
    certificate: OnceLock<Option<Arc<PeerCertificate>>>,
}

impl ClientConnection {
    pub fn new(
        id: impl Into<String>,
        remote_ip: IpAddr,
        remote_port: u16,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            id: id.into(),
            remote_ip,
            remote_port,
            transport,
            certificate: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote_ip
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Sanitized peer certificate, fetched once per connection lifetime.
    ///
    /// A missing certificate or a failing fetch yields `None` and is cached
    /// as well; absence is an expected outcome, not an error.
    pub fn certificate(&self) -> Option<Arc<PeerCertificate>> {
        self.certificate
            .get_or_init(|| match self.transport.peer_certificate() {
                Ok(Some(raw)) => Some(Arc::new(raw.sanitize())),
                Ok(None) => {
                    tracing::debug!(conn = %self.id, "peer presented no certificate");
                    None
                }
                Err(e) => {
                    tracing::debug!(conn = %self.id, error = %e, "peer certificate fetch failed");
                    None
                }
            })
            .clone()
    }

    /// Cached certificate without triggering a fetch.
    pub fn cached_certificate(&self) -> Option<Arc<PeerCertificate>> {
        self.certificate.get().cloned().flatten()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_ip", &self.remote_ip)
            .field("remote_port", &self.remote_port)
            .field("certificate_cached", &self.certificate.get().is_some())
            .finish()
    }
}
