//! Endocrine core: transport-agnostic primitives shared by the broker gate.
//!
//! Topic classification, the peer certificate model with its sanitization
//! step, CA fingerprinting and the error surface. No async runtime is pulled
//! in here so the primitives can be reused by engines and tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed certificates surface as `EndocrineError` instead of crashing
//! the broker process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cert;
pub mod error;
pub mod fingerprint;
pub mod topic;

/// Shared result type.
pub use error::{EndocrineError, Result};

pub use cert::{DistinguishedName, PeerCertificate, RawPeerCertificate};
pub use fingerprint::ca_fingerprint;
pub use topic::{classify, TopicClass};
