//! Node and pin identifiers.
//!
//! Ids are 64-bit, issued by a thread-safe monotonically increasing counter.
//! Nodes and pins draw from the same counter so an id names exactly one
//! object within a graph. Id `0` is never issued.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Unique identifier for a node within a graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

/// Unique identifier for a pin (input or output) within a graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinId(pub(crate) u64);

impl NodeId {
    /// Raw numeric value, for persistence and display.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl PinId {
    /// Raw numeric value, for persistence and display.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Debug for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinId({})", self.0)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// Thread-safe id counter.
///
/// Cloning shares the counter. [`IdAllocator::global`] is the process-wide
/// instance every [`Graph`](crate::Graph) uses unless it was built with its
/// own allocator.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: Arc<AtomicU64>,
}

impl IdAllocator {
    /// A fresh, private counter starting at 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The process-wide counter.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<IdAllocator> = OnceLock::new();
        GLOBAL.get_or_init(IdAllocator::new).clone()
    }

    pub(crate) fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue a new node id.
    pub fn next_node(&self) -> NodeId {
        NodeId(self.next_raw())
    }

    /// Issue a new pin id.
    pub fn next_pin(&self) -> PinId {
        PinId(self.next_raw())
    }

    /// Whether another handle (another graph, or the process-wide instance)
    /// draws from the same counter.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.next) > 1
    }

    /// Start over from 1.
    ///
    /// Only safe while nothing else draws from this counter; see
    /// [`is_shared`](Self::is_shared).
    pub fn reset(&self) {
        self.next.store(1, Ordering::Relaxed);
    }

    /// Make sure no id `<= max_seen` is ever issued again.
    ///
    /// Called after loading a graph so freshly created pins never collide
    /// with restored ones.
    pub fn advance_past(&self, max_seen: u64) {
        self.next.fetch_max(max_seen.saturating_add(1), Ordering::Relaxed);
    }

    /// The id the next call will return (for diagnostics).
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_shared_between_kinds() {
        let ids = IdAllocator::new();
        let a = ids.next_node();
        let b = ids.next_pin();
        let c = ids.next_node();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert_eq!(c.raw(), 3);
    }

    #[test]
    fn reset_and_advance() {
        let ids = IdAllocator::new();
        ids.next_pin();
        ids.next_pin();
        ids.reset();
        assert_eq!(ids.next_pin().raw(), 1);

        ids.advance_past(41);
        assert_eq!(ids.next_node().raw(), 42);

        // never moves backwards
        ids.advance_past(3);
        assert_eq!(ids.next_node().raw(), 43);
    }

    #[test]
    fn clones_share_the_counter() {
        let a = IdAllocator::new();
        assert!(!a.is_shared());
        let b = a.clone();
        assert!(a.is_shared());
        a.next_pin();
        assert_eq!(b.next_pin().raw(), 2);
        drop(b);
        assert!(!a.is_shared());
        assert!(IdAllocator::global().is_shared());
    }

    #[test]
    fn advancing_past_the_last_id_saturates() {
        let ids = IdAllocator::new();
        ids.advance_past(u64::MAX);
        assert_eq!(ids.peek(), u64::MAX);
    }
}
