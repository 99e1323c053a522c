//! The core error taxonomy, shared across every subsystem crate.
//!
//! Internal crates (`unicast-pff`, `unicast-graph`, `unicast-routing`,
//! `unicast-dt`, `unicast-dht`) define their own `thiserror` enums for
//! precise, independently testable variants, and convert into
//! [`CoreError`] at the glue layer so callers of the top-level API see one
//! stable error type.

use thiserror::Error;

/// The stable error surface for the unicast core's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The forwarding table has no entry for `(qos, dst)`.
    #[error("no route for destination")]
    NoRoute,

    /// A received packet had `ttl == 0` at the point it would be forwarded.
    #[error("ttl expired")]
    TtlExpired,

    /// The downstream flow chosen for forwarding is unusable.
    #[error("flow down")]
    FlowDown,

    /// The local EID addressed has no registered component.
    #[error("no component registered for eid")]
    NoComponent,

    /// The operation was attempted after shutdown.
    #[error("operation attempted after shutdown")]
    Shutdown,

    /// A lookup, request, or join exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An allocation failed (e.g. no free reserved EID, bucket capacity).
    #[error("resource exhausted: {reason}")]
    Resource {
        /// What resource was unavailable.
        reason: String,
    },

    /// A malformed message or bad field width was encountered.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable cause, for the "log once per cause" policy.
        reason: String,
    },
}

/// Convenience alias used throughout the core crates.
pub type Result<T> = std::result::Result<T, CoreError>;
