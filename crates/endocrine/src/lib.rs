//! Top-level facade crate for the endocrine broker gate.
//!
//! Re-exports core types and the broker library so users can depend on a single crate.

pub mod core {
    pub use endocrine_core::*;
}

pub mod broker {
    pub use endocrine_broker::*;
}
