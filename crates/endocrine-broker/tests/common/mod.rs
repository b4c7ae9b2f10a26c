#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use endocrine_broker::config::{self, SystemConfig};
use endocrine_broker::connection::{ClientConnection, StaticPeer};
use endocrine_broker::engine::{MemoryClient, MemoryEngine};
use endocrine_core::RawPeerCertificate;

pub const CLIENT_DER: &[u8] = include_bytes!("../pki/client.der");

pub const CA_FINGERPRINT: &str =
    "60:62:28:76:ca:73:90:a3:f5:8b:16:4a:ab:bc:8b:c1:c1:e7:49:b8:33:8f:22:90:21:8f:58:30:71:0e:cc:1d";

pub fn pki(file: &str) -> String {
    format!("{}/tests/pki/{file}", env!("CARGO_MANIFEST_DIR"))
}

pub fn client_cert() -> RawPeerCertificate {
    RawPeerCertificate::from_der(CLIENT_DER).unwrap()
}

pub fn system_config(port: u16, ca_file: &str, backend: &str, stats_ms: u64) -> SystemConfig {
    let yaml = format!(
        r#"
version: 1
broker:
  port: {port}
tls:
  cert_path: "{cert}"
  key_path: "{key}"
  ca_path: "{ca}"
backend:
  url: "{backend}"
stats:
  interval_ms: {stats_ms}
"#,
        cert = pki("server.crt"),
        key = pki("server.key"),
        ca = pki(ca_file),
    );
    config::load_from_str(&yaml).unwrap()
}

pub fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Connection carrying the test client certificate (or none).
pub fn connection(id: &str, with_cert: bool) -> ClientConnection {
    let peer = StaticPeer(with_cert.then(client_cert));
    ClientConnection::new(id, localhost(), 50_000, Arc::new(peer))
}

pub fn connect(engine: &Arc<MemoryEngine>, id: &str, with_cert: bool) -> MemoryClient {
    let peer = StaticPeer(with_cert.then(client_cert));
    engine.connect(id, localhost(), 50_000, Arc::new(peer)).unwrap()
}
