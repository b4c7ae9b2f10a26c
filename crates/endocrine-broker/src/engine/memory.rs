//! In-process broker engine.
//!
//! Enough of a broker to drive the gate end to end: connections, publish,
//! subscriptions with `+`/`#` filters, retained messages kept in a store
//! shared per backend URL (so a second engine on the same URL sees what the
//! first one retained). No wire protocol, no TLS handshake.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

use endocrine_core::error::{EndocrineError, Result};

use super::{
    BrokerEngine, Completion, EngineFactory, EngineSettings, ForwardHook, ForwardPacket, HookSlot,
    PublishHook,
};
use crate::arbiter::Decision;
use crate::connection::{ClientConnection, PeerTransport};

/// Retained-message storage shared by engines on the same backend URL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    retained: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.retained.get(topic).map(|r| r.value().clone())
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    // Empty payload clears the retained message.
    fn store_retained(&self, topic: &str, payload: Bytes) {
        if payload.is_empty() {
            self.retained.remove(topic);
        } else {
            self.retained.insert(topic.to_owned(), payload);
        }
    }

    fn matching(&self, filter: &str) -> Vec<(String, Bytes)> {
        self.retained
            .iter()
            .filter(|r| topic_matches(filter, r.key()))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

/// MQTT-style filter match (`+` one level, `#` the rest).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(fl), Some(tl)) if fl == tl => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Message handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

struct Subscriber {
    conn: Arc<ClientConnection>,
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

pub struct MemoryEngine {
    settings: EngineSettings,
    store: Arc<MemoryStore>,
    publish_hook: HookSlot<dyn PublishHook>,
    forward_hook: HookSlot<dyn ForwardHook>,
    ready_tx: watch::Sender<bool>,
    closed: AtomicBool,
    clients: DashMap<String, Subscriber>,
}

impl MemoryEngine {
    pub fn new(settings: EngineSettings, store: Arc<MemoryStore>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            settings,
            store,
            publish_hook: HookSlot::new("publish"),
            forward_hook: HookSlot::new("forward"),
            ready_tx,
            closed: AtomicBool::new(false),
            clients: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Signal readiness (engines from a manual-ready factory wait for this).
    pub fn mark_ready(&self) {
        self.ready_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EndocrineError::Engine("engine closed".into()));
        }
        Ok(())
    }

    /// Accept a connection whose handshake already succeeded.
    pub fn connect(
        self: &Arc<Self>,
        id: impl Into<String>,
        remote_ip: IpAddr,
        remote_port: u16,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<MemoryClient> {
        self.ensure_open()?;
        let conn = Arc::new(ClientConnection::new(id, remote_ip, remote_port, transport));
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(
            conn.id().to_owned(),
            Subscriber { conn: Arc::clone(&conn), filters: Vec::new(), tx },
        );
        tracing::debug!(conn = %conn.id(), ip = %remote_ip, port = remote_port, "client connected");
        Ok(MemoryClient { engine: Arc::clone(self), conn, rx })
    }

    async fn publish(&self, conn: &Arc<ClientConnection>, topic: &str, payload: Bytes, retain: bool) -> Result<Decision> {
        self.ensure_open()?;
        let hook = self
            .publish_hook
            .get()
            .ok_or_else(|| EndocrineError::Engine("publish hook not installed".into()))?;

        let (done, rx) = Completion::new();
        hook.authorize_publish(Arc::clone(conn), topic.to_owned(), payload.clone(), done).await;
        let decision = rx
            .await
            .map_err(|_| EndocrineError::Engine("publish hook dropped its completion".into()))?;
        if !decision.is_allow() {
            return Ok(decision);
        }

        if retain {
            self.store.store_retained(topic, payload.clone());
        }

        let targets: Vec<_> = self
            .clients
            .iter()
            .filter(|s| s.filters.iter().any(|f| topic_matches(f, topic)))
            .map(|s| (Arc::clone(&s.conn), s.tx.clone()))
            .collect();

        for (sub, tx) in targets {
            let id = sub.id().to_owned();
            let packet = ForwardPacket { topic: topic.to_owned(), payload: payload.clone(), retain: false };
            if let Err(e) = self.forward(sub, &tx, packet).await {
                tracing::warn!(conn = %id, topic = %topic, error = %e, "forward failed");
            }
        }
        Ok(decision)
    }

    async fn subscribe(&self, conn: &Arc<ClientConnection>, filter: &str) -> Result<()> {
        self.ensure_open()?;
        let tx = {
            let mut entry = self
                .clients
                .get_mut(conn.id())
                .ok_or_else(|| EndocrineError::Engine(format!("unknown connection {}", conn.id())))?;
            entry.filters.push(filter.to_owned());
            entry.tx.clone()
        };

        for (topic, payload) in self.store.matching(filter) {
            let packet = ForwardPacket { topic, payload, retain: true };
            self.forward(Arc::clone(conn), &tx, packet).await?;
        }
        Ok(())
    }

    async fn forward(
        &self,
        conn: Arc<ClientConnection>,
        tx: &mpsc::UnboundedSender<Delivery>,
        packet: ForwardPacket,
    ) -> Result<Decision> {
        let hook = self
            .forward_hook
            .get()
            .ok_or_else(|| EndocrineError::Engine("forward hook not installed".into()))?;

        let (done, rx) = Completion::new();
        hook.authorize_forward(conn, packet.clone(), done).await;
        let decision = rx
            .await
            .map_err(|_| EndocrineError::Engine("forward hook dropped its completion".into()))?;

        if decision.is_allow() {
            // Receiver gone means the client went away; nothing to deliver to.
            let _ = tx.send(Delivery { topic: packet.topic, payload: packet.payload, retain: packet.retain });
        }
        Ok(decision)
    }
}

#[async_trait]
impl BrokerEngine for MemoryEngine {
    async fn ready(&self) -> Result<()> {
        let mut rx = self.ready_tx.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map_err(|_| EndocrineError::Engine("engine dropped before ready".into()))?;
        Ok(())
    }

    fn install_publish_hook(&self, hook: Arc<dyn PublishHook>) -> Result<()> {
        self.publish_hook.install(hook)
    }

    fn install_forward_hook(&self, hook: Arc<dyn ForwardHook>) -> Result<()> {
        self.forward_hook.install(hook)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.clients.clear();
        tracing::debug!(port = self.settings.port, "memory engine closed");
        Ok(())
    }
}

/// Client side of a memory-engine connection.
pub struct MemoryClient {
    engine: Arc<MemoryEngine>,
    conn: Arc<ClientConnection>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl MemoryClient {
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.conn
    }

    /// Publish; resolves with the gate's decision once fan-out is done.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>, retain: bool) -> Result<Decision> {
        self.engine.publish(&self.conn, topic, payload.into(), retain).await
    }

    pub async fn subscribe(&self, filter: &str) -> Result<()> {
        self.engine.subscribe(&self.conn, filter).await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl Drop for MemoryClient {
    // Disconnect: stop routing to this client.
    fn drop(&mut self) {
        let removed = self
            .engine
            .clients
            .remove_if(self.conn.id(), |_, s| Arc::ptr_eq(&s.conn, &self.conn));
        if removed.is_some() {
            tracing::debug!(conn = %self.conn.id(), "client disconnected");
        }
    }
}

/// Factory creating memory engines; stores are shared per backend URL.
#[derive(Default)]
pub struct MemoryEngineFactory {
    stores: DashMap<String, Arc<MemoryStore>>,
    engines: DashMap<u16, Arc<MemoryEngine>>,
    manual_ready: bool,
}

impl MemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines wait for `MemoryEngine::mark_ready` instead of being ready at once.
    pub fn with_manual_ready() -> Self {
        Self { manual_ready: true, ..Self::default() }
    }

    pub fn store(&self, url: &str) -> Arc<MemoryStore> {
        Arc::clone(&self.stores.entry(url.to_owned()).or_default())
    }

    /// Most recent engine created for `port`.
    pub fn engine(&self, port: u16) -> Option<Arc<MemoryEngine>> {
        self.engines.get(&port).map(|e| Arc::clone(e.value()))
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn create(&self, settings: &EngineSettings) -> Result<Arc<dyn BrokerEngine>> {
        if let Some(existing) = self.engine(settings.port) {
            if !existing.is_closed() {
                return Err(EndocrineError::Engine(format!("port {} already in use", settings.port)));
            }
        }

        let engine = Arc::new(MemoryEngine::new(settings.clone(), self.store(&settings.backend.url)));
        if !self.manual_ready {
            engine.mark_ready();
        }
        self.engines.insert(settings.port, Arc::clone(&engine));
        Ok(engine)
    }
}
