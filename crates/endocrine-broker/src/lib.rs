//! Endocrine broker gate.
//!
//! Wires the access-control predicates, the decision arbiter and the event
//! sinks into the publish/forward hooks of a broker engine, and sequences
//! engine startup, CA fingerprinting, service advertisement and shutdown.
//! Consumed by the binary (`main.rs`) and by integration tests.

pub mod access;
pub mod advertise;
pub mod arbiter;
pub mod config;
pub mod connection;
pub mod engine;
pub mod events;
pub mod fingerprint;
pub mod gate;
pub mod lifecycle;
pub mod obs;

pub use access::{AccessControlHandlers, AccessDenied, AccessFuture, AccessPredicate, AllowAll, DenyAll, HandlerFault};
pub use arbiter::{Decision, Direction};
pub use events::{ChannelSink, EventSink, ReadyInfo, SystemEvent, TracingSink};
pub use lifecycle::{EndocrineSystem, LifecycleState, SystemOptions};
