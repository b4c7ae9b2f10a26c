//! Broker engine seam.
//!
//! The engine (wire protocol, routing, retained storage, TLS handshake) is a
//! collaborator. The gate needs four things from it: a readiness signal, two
//! single-assignment hook slots, and an asynchronous close.

pub mod memory;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use endocrine_core::error::{EndocrineError, Result};

use crate::arbiter::Decision;
use crate::config::SystemConfig;
use crate::connection::ClientConnection;

pub use memory::{Delivery, MemoryClient, MemoryEngine, MemoryEngineFactory, MemoryStore};

/// Consume-once completion the engine waits on for one decision.
///
/// Moving `self` into `complete` makes a second callback impossible.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Decision>,
}

impl Completion {
    pub fn new() -> (Self, oneshot::Receiver<Decision>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Hand the decision to the engine. Returns `false` if the engine stopped
    /// waiting (e.g. it is closing); the decision is then discarded.
    pub fn complete(self, decision: Decision) -> bool {
        self.tx.send(decision).is_ok()
    }
}

/// Message about to be delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct ForwardPacket {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

#[async_trait]
pub trait PublishHook: Send + Sync {
    async fn authorize_publish(
        &self,
        conn: Arc<ClientConnection>,
        topic: String,
        payload: Bytes,
        done: Completion,
    );
}

#[async_trait]
pub trait ForwardHook: Send + Sync {
    async fn authorize_forward(&self, conn: Arc<ClientConnection>, packet: ForwardPacket, done: Completion);
}

#[async_trait]
pub trait BrokerEngine: Send + Sync {
    /// Resolves once the engine is listening. Called once per instance.
    async fn ready(&self) -> Result<()>;
    fn install_publish_hook(&self, hook: Arc<dyn PublishHook>) -> Result<()>;
    fn install_forward_hook(&self, hook: Arc<dyn ForwardHook>) -> Result<()>;
    /// Resolves once the engine is fully stopped.
    async fn close(&self) -> Result<()>;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, settings: &EngineSettings) -> Result<Arc<dyn BrokerEngine>>;
}

/// Listener TLS settings handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_path: String,
    pub key_path: String,
    pub ca_paths: Vec<String>,
    /// Ask every client for a certificate.
    pub request_cert: bool,
    /// Refuse clients whose certificate does not chain to `ca_paths`.
    pub reject_unauthorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub url: String,
    pub pubsub_collection: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub port: u16,
    pub tls: TlsSettings,
    pub backend: BackendSettings,
}

impl EngineSettings {
    /// Mutual TLS is always on: clients must present a certificate signed by
    /// the configured CA or the handshake fails.
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            port: cfg.broker.port,
            tls: TlsSettings {
                cert_path: cfg.tls.cert_path.clone(),
                key_path: cfg.tls.key_path.clone(),
                ca_paths: vec![cfg.tls.ca_path.clone()],
                request_cert: true,
                reject_unauthorized: true,
            },
            backend: BackendSettings {
                url: cfg.backend.url.clone(),
                pubsub_collection: cfg.backend.pubsub_collection.clone(),
            },
        }
    }
}

/// Single-assignment hook slot for engine implementations.
pub struct HookSlot<T: ?Sized> {
    name: &'static str,
    slot: OnceLock<Arc<T>>,
}

impl<T: ?Sized> HookSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, slot: OnceLock::new() }
    }

    pub fn install(&self, hook: Arc<T>) -> Result<()> {
        self.slot
            .set(hook)
            .map_err(|_| EndocrineError::Engine(format!("{} hook already installed", self.name)))
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.get().cloned()
    }
}
