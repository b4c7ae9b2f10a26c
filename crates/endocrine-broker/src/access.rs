//! Access-control predicates.
//!
//! Four independent predicates decide over publish (`in`) and forward (`out`)
//! of managed topics and of every other topic. A predicate receives the
//! sanitized peer certificate and the name (managed topics) or the full topic
//! (other topics) and settles asynchronously: `Ok(())` grants, anything else
//! denies.
//!
//! A valid predicate return is `Ok(AccessFuture)`. Returning
//! `Err(HandlerFault)`, or panicking before a future exists, means "no
//! deferred outcome" and the arbiter rejects.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use endocrine_core::PeerCertificate;

/// Deferred outcome of a predicate.
pub type AccessFuture = BoxFuture<'static, Result<(), AccessDenied>>;

/// Explicit denial from a predicate.
#[derive(Debug, Clone, Default, Error)]
#[error("access denied{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
pub struct AccessDenied {
    pub reason: Option<String>,
}

impl AccessDenied {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: Some(reason.into()) }
    }
}

/// A predicate could not produce a deferred outcome.
#[derive(Debug, Clone, Error)]
#[error("handler fault: {0}")]
pub struct HandlerFault(pub String);

pub trait AccessPredicate: Send + Sync {
    fn check(&self, cert: Arc<PeerCertificate>, name: &str) -> Result<AccessFuture, HandlerFault>;
}

impl<F, Fut> AccessPredicate for F
where
    F: Fn(Arc<PeerCertificate>, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AccessDenied>> + Send + 'static,
{
    fn check(&self, cert: Arc<PeerCertificate>, name: &str) -> Result<AccessFuture, HandlerFault> {
        Ok(Box::pin(self(cert, name.to_owned())))
    }
}

/// Predicate used for every slot that was not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AccessPredicate for DenyAll {
    fn check(&self, _cert: Arc<PeerCertificate>, _name: &str) -> Result<AccessFuture, HandlerFault> {
        Ok(Box::pin(async { Err(AccessDenied::new("no access control configured")) }))
    }
}

/// Grants everything. Handy for tests and open deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPredicate for AllowAll {
    fn check(&self, _cert: Arc<PeerCertificate>, _name: &str) -> Result<AccessFuture, HandlerFault> {
        Ok(Box::pin(async { Ok(()) }))
    }
}

fn deny_all() -> Arc<dyn AccessPredicate> {
    Arc::new(DenyAll)
}

/// Managed/other predicate pair for one direction.
#[derive(Clone)]
pub struct DirectionalHandlers {
    pub managed: Arc<dyn AccessPredicate>,
    pub other: Arc<dyn AccessPredicate>,
}

/// The full predicate set. Unset slots deny.
#[derive(Clone)]
pub struct AccessControlHandlers {
    inbound: DirectionalHandlers,
    outbound: DirectionalHandlers,
}

impl Default for AccessControlHandlers {
    fn default() -> Self {
        Self::deny_all()
    }
}

impl AccessControlHandlers {
    pub fn deny_all() -> Self {
        Self {
            inbound: DirectionalHandlers { managed: deny_all(), other: deny_all() },
            outbound: DirectionalHandlers { managed: deny_all(), other: deny_all() },
        }
    }

    /// Publish of `hormone/*` and `definition/*`.
    pub fn inbound(mut self, p: impl AccessPredicate + 'static) -> Self {
        self.inbound.managed = Arc::new(p);
        self
    }

    /// Publish of any other topic.
    pub fn inbound_other(mut self, p: impl AccessPredicate + 'static) -> Self {
        self.inbound.other = Arc::new(p);
        self
    }

    /// Forward of `hormone/*` and `definition/*`.
    pub fn outbound(mut self, p: impl AccessPredicate + 'static) -> Self {
        self.outbound.managed = Arc::new(p);
        self
    }

    /// Forward of any other topic.
    pub fn outbound_other(mut self, p: impl AccessPredicate + 'static) -> Self {
        self.outbound.other = Arc::new(p);
        self
    }

    pub fn inbound_handlers(&self) -> &DirectionalHandlers {
        &self.inbound
    }

    pub fn outbound_handlers(&self) -> &DirectionalHandlers {
        &self.outbound
    }
}
