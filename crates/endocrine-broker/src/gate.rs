//! Authorization gate.
//!
//! Binds the arbiter to the engine's publish and forward hooks. Each call
//! completes the engine's `Completion` first, then emits the audit event,
//! so a broken sink can never hold up or change a decision.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::FutureExt;

use crate::access::AccessControlHandlers;
use crate::arbiter::{self, Decision, Direction, Verdict, VerdictReason};
use crate::connection::ClientConnection;
use crate::engine::{Completion, ForwardHook, ForwardPacket, PublishHook};
use crate::events::{emit_guarded, AuditEnv, EventSink, SystemEvent};
use crate::obs::{BrokerMetrics, TrafficStats};

pub struct AuthorizationGate {
    handlers: AccessControlHandlers,
    sink: Arc<dyn EventSink>,
    metrics: Arc<BrokerMetrics>,
    stats: Arc<TrafficStats>,
}

impl AuthorizationGate {
    pub fn new(
        handlers: AccessControlHandlers,
        sink: Arc<dyn EventSink>,
        metrics: Arc<BrokerMetrics>,
        stats: Arc<TrafficStats>,
    ) -> Self {
        Self { handlers, sink, metrics, stats }
    }

    pub fn metrics(&self) -> &BrokerMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    async fn authorize(
        &self,
        direction: Direction,
        conn: &ClientConnection,
        topic: String,
        payload_length: usize,
        done: Completion,
    ) -> Decision {
        let handlers = match direction {
            Direction::Inbound => self.handlers.inbound_handlers(),
            Direction::Outbound => self.handlers.outbound_handlers(),
        };

        let started = Instant::now();
        let verdict = AssertUnwindSafe(arbiter::evaluate(handlers, conn, &topic))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(conn = %conn.id(), topic = %topic, "authorization faulted");
                Verdict::reject(VerdictReason::InternalFault, "none")
            });

        let dir = direction.as_str();
        self.metrics.decision_duration.observe(&[("direction", dir)], started.elapsed());
        self.metrics.decisions.inc(&[
            ("direction", dir),
            ("class", verdict.class),
            ("decision", verdict.decision.as_str()),
            ("reason", verdict.reason.as_str()),
        ]);
        if verdict.decision.is_allow() {
            self.stats.record(direction, payload_length);
        }

        if !done.complete(verdict.decision) {
            tracing::debug!(conn = %conn.id(), topic = %topic, "engine stopped waiting, decision discarded");
        }

        let env = AuditEnv {
            connection_id: conn.id().to_owned(),
            remote_ip: conn.remote_ip(),
            remote_port: conn.remote_port(),
            topic,
            payload_length,
            certificate: conn.cached_certificate(),
        };
        emit_guarded(self.sink.as_ref(), &self.metrics, audit_event(direction, verdict.decision, env));

        verdict.decision
    }
}

fn audit_event(direction: Direction, decision: Decision, env: AuditEnv) -> SystemEvent {
    match (direction, decision) {
        (Direction::Inbound, Decision::Allow) => SystemEvent::InPassed(env),
        (Direction::Inbound, Decision::Reject) => SystemEvent::InRejected(env),
        (Direction::Outbound, Decision::Allow) => SystemEvent::OutPassed(env),
        (Direction::Outbound, Decision::Reject) => SystemEvent::OutRejected(env),
    }
}

#[async_trait]
impl PublishHook for AuthorizationGate {
    async fn authorize_publish(
        &self,
        conn: Arc<ClientConnection>,
        topic: String,
        payload: Bytes,
        done: Completion,
    ) {
        self.authorize(Direction::Inbound, &conn, topic, payload.len(), done).await;
    }
}

#[async_trait]
impl ForwardHook for AuthorizationGate {
    async fn authorize_forward(&self, conn: Arc<ClientConnection>, packet: ForwardPacket, done: Completion) {
        self.authorize(Direction::Outbound, &conn, packet.topic, packet.payload.len(), done).await;
    }
}
