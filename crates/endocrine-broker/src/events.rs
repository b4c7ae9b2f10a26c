//! System events and sinks.
//!
//! Every authorization decision produces one audit event, the lifecycle
//! produces `ready`, and the stats reporter produces `stats`. Events are
//! fire-and-forget: sinks never block and a failing sink never changes an
//! authorization outcome.

use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use endocrine_core::PeerCertificate;

use crate::obs::{BrokerMetrics, StatsSnapshot};

/// Environment of an audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEnv {
    pub connection_id: String,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub topic: String,
    pub payload_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Arc<PeerCertificate>>,
}

/// Payload of the `ready` event; also what `EndocrineSystem::ready` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyInfo {
    pub port: u16,
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub enum SystemEvent {
    Ready(ReadyInfo),
    InPassed(AuditEnv),
    InRejected(AuditEnv),
    OutPassed(AuditEnv),
    OutRejected(AuditEnv),
    Stats(StatsSnapshot),
}

/// Log level of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Notice,
    Debug,
}

impl SystemEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            SystemEvent::Ready(_) => "ready",
            SystemEvent::InPassed(_) => "inPassed",
            SystemEvent::InRejected(_) => "inRejected",
            SystemEvent::OutPassed(_) => "outPassed",
            SystemEvent::OutRejected(_) => "outRejected",
            SystemEvent::Stats(_) => "stats",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            SystemEvent::InPassed(_) | SystemEvent::OutPassed(_) => EventLevel::Debug,
            _ => EventLevel::Notice,
        }
    }

    pub fn audit_env(&self) -> Option<&AuditEnv> {
        match self {
            SystemEvent::InPassed(env)
            | SystemEvent::InRejected(env)
            | SystemEvent::OutPassed(env)
            | SystemEvent::OutRejected(env) => Some(env),
            _ => None,
        }
    }

    /// Human-readable one-liner.
    pub fn describe(&self) -> String {
        match self {
            SystemEvent::Ready(r) => format!("Listening to port {}", r.port),
            SystemEvent::Stats(s) => format!(
                "Stats: {} ingress messages ({}B); {} outgress messages ({}B)",
                s.messages_in, s.bytes_in, s.messages_out, s.bytes_out
            ),
            SystemEvent::InPassed(e) => format!("Granted ingress message on topic {} from {} (IP: {})", e.topic, e.connection_id, e.remote_ip),
            SystemEvent::InRejected(e) => format!("Rejected ingress message on topic {} from {} (IP: {})", e.topic, e.connection_id, e.remote_ip),
            SystemEvent::OutPassed(e) => format!("Granted outgress message on topic {} to {} (IP: {})", e.topic, e.connection_id, e.remote_ip),
            SystemEvent::OutRejected(e) => format!("Rejected outgress message on topic {} to {} (IP: {})", e.topic, e.connection_id, e.remote_ip),
        }
    }

    /// Event environment as JSON.
    pub fn env_json(&self) -> serde_json::Value {
        let env = match self {
            SystemEvent::Ready(r) => serde_json::to_value(r),
            SystemEvent::Stats(s) => serde_json::to_value(s),
            SystemEvent::InPassed(e)
            | SystemEvent::InRejected(e)
            | SystemEvent::OutPassed(e)
            | SystemEvent::OutRejected(e) => serde_json::to_value(e),
        };
        env.unwrap_or_else(|e| json!({ "error": e.to_string() }))
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("event sink closed")]
    Closed,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SystemEvent) -> Result<(), EmitError>;
}

/// Writes events to `tracing`. Notice-level events go to INFO, the rest to DEBUG.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SystemEvent) -> Result<(), EmitError> {
        let name = event.name();
        match event.level() {
            EventLevel::Notice => {
                tracing::info!(event = name, env = %event.env_json(), "{}", event.describe())
            }
            EventLevel::Debug => {
                tracing::debug!(event = name, env = %event.env_json(), "{}", event.describe())
            }
        }
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SystemEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SystemEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SystemEvent) -> Result<(), EmitError> {
        self.tx.send(event).map_err(|_| EmitError::Closed)
    }
}

/// Sends every event to each inner sink; reports the first failure after
/// all sinks were tried.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: SystemEvent) -> Result<(), EmitError> {
        let mut result = Ok(());
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event.clone()) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// Emit without letting a sink error or panic escape to the caller.
pub(crate) fn emit_guarded(sink: &dyn EventSink, metrics: &BrokerMetrics, event: SystemEvent) {
    let name = event.name();
    match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            metrics.events_dropped.inc(&[("event", name)]);
            tracing::debug!(event = name, error = %e, "event not delivered");
        }
        Err(_) => {
            metrics.events_dropped.inc(&[("event", name)]);
            tracing::warn!(event = name, "event sink panicked");
        }
    }
}
