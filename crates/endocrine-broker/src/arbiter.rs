//! Decision arbiter.
//!
//! Turns (predicate set, connection, topic) into exactly one `Decision`.
//! No certificate means reject before any predicate runs. Predicate faults
//! of any kind (sync error, panic while building or polling the future,
//! explicit denial) reject. There is no timeout; the engine's own connection
//! timeouts bound a predicate that never settles.

use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;

use endocrine_core::topic::{classify, TopicClass};

use crate::access::DirectionalHandlers;
use crate::connection::ClientConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Reject => "reject",
        }
    }
}

/// Hook direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Publish from a client into the broker.
    Inbound,
    /// Forward from the broker to a subscriber.
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictReason {
    Granted,
    NoCertificate,
    Denied,
    HandlerFault,
    HandlerPanicked,
    /// Fault outside the predicate (certificate fetch, classification).
    InternalFault,
}

impl VerdictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictReason::Granted => "granted",
            VerdictReason::NoCertificate => "no_certificate",
            VerdictReason::Denied => "denied",
            VerdictReason::HandlerFault => "handler_fault",
            VerdictReason::HandlerPanicked => "handler_panicked",
            VerdictReason::InternalFault => "internal_fault",
        }
    }
}

/// Decision plus the context metrics and logs want.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: VerdictReason,
    /// "managed", "other", or "none" when no predicate was consulted.
    pub class: &'static str,
}

impl Verdict {
    fn allow(class: &'static str) -> Self {
        Self { decision: Decision::Allow, reason: VerdictReason::Granted, class }
    }

    pub(crate) fn reject(reason: VerdictReason, class: &'static str) -> Self {
        Self { decision: Decision::Reject, reason, class }
    }
}

/// Decide a single publish/forward attempt.
pub async fn decide(handlers: &DirectionalHandlers, conn: &ClientConnection, topic: &str) -> Decision {
    evaluate(handlers, conn, topic).await.decision
}

/// Like `decide`, keeping the reason.
pub async fn evaluate(handlers: &DirectionalHandlers, conn: &ClientConnection, topic: &str) -> Verdict {
    let Some(cert) = conn.certificate() else {
        return Verdict::reject(VerdictReason::NoCertificate, "none");
    };

    let class = classify(topic);
    let (predicate, name) = match class {
        TopicClass::Managed { name } => (&handlers.managed, name),
        TopicClass::Other => (&handlers.other, topic),
    };
    let label = class.label();

    let started = panic::catch_unwind(AssertUnwindSafe(|| predicate.check(cert, name)));
    let fut = match started {
        Ok(Ok(fut)) => fut,
        Ok(Err(fault)) => {
            tracing::debug!(conn = %conn.id(), topic = %topic, error = %fault, "predicate returned no outcome");
            return Verdict::reject(VerdictReason::HandlerFault, label);
        }
        Err(_) => {
            tracing::warn!(conn = %conn.id(), topic = %topic, "predicate panicked");
            return Verdict::reject(VerdictReason::HandlerPanicked, label);
        }
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Verdict::allow(label),
        Ok(Err(denied)) => {
            tracing::trace!(conn = %conn.id(), topic = %topic, %denied, "predicate denied");
            Verdict::reject(VerdictReason::Denied, label)
        }
        Err(_) => {
            tracing::warn!(conn = %conn.id(), topic = %topic, "predicate panicked while settling");
            Verdict::reject(VerdictReason::HandlerPanicked, label)
        }
    }
}
