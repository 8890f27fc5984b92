// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for the agent core.
//!
//! Library code returns [`AgentError`]; the binary wraps it in `anyhow` at
//! the call site for narrative context, keeping a typed library error
//! distinct from a chained binary error.

use thiserror::Error;

/// The five failure categories this agent distinguishes.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed escape sequence or wrong field count on the wire. Fatal
    /// for the connection that produced it.
    #[error("codec error: {0}")]
    Codec(String),

    /// A protocol invariant was violated (Accept for an unexpected seq, a
    /// message arriving in the wrong state). Fatal; the agent gives up on
    /// doc sync.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connect, read, write, or EOF failure. Recoverable: the transport
    /// reconnects with backoff.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A BreakTree or OT invariant was violated. Indicates a bug in this
    /// crate, not a remote peer's misbehavior.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The host editor rejected or failed a callback. Reported, not fatal.
    #[error("editor callback failed: {0}")]
    EditorCallback(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
