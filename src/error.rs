//! Recoverable graph errors.
//!
//! Structural misuse (wrong pin role, unknown ids handed to internal
//! operations, inconsistent bookkeeping) panics instead; these variants cover
//! what a caller such as an editor can reasonably react to.

use thiserror::Error;

use crate::id::{NodeId, PinId};
use crate::value::ValueKind;

/// Errors returned by graph operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("cannot connect {output} ({from:?}) to {input} ({to:?}): no conversion")]
    Incompatible {
        output: PinId,
        input: PinId,
        from: ValueKind,
        to: ValueKind,
    },

    #[error("connecting {output} to {input} would create a cycle")]
    WouldCycle { output: PinId, input: PinId },

    #[error("input {input} already has a connection")]
    AlreadyConnected { input: PinId },

    #[error("{output} is not connected to {input}")]
    NotConnected { output: PinId, input: PinId },

    #[error("event queue on {pin} is full (capacity {capacity})")]
    QueueFull { pin: PinId, capacity: usize },

    #[error("no node type registered for hash {0:#018x}")]
    UnknownNodeType(u64),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown pin {0}")]
    UnknownPin(PinId),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
