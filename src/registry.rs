//! Node factory keyed by a stable hash of the node's type name.

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::node::Node;
use crate::value::ValueKind;

/// 64-bit FNV-1a of `name`. Stable across runs and builds, so it can be
/// written to disk.
pub const fn type_hash(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let bytes = name.as_bytes();
    let mut hash = OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

type Factory = fn() -> Box<dyn Node>;

fn make<N: Node + Default>() -> Box<dyn Node> {
    Box::new(N::default())
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    name: &'static str,
    factory: Factory,
}

/// Pin kinds a node type declares, inputs then outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinKinds {
    pub inputs: Vec<ValueKind>,
    pub outputs: Vec<ValueKind>,
}

/// Known node types, for editors and for restoring snapshots.
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<u64, Entry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every node type shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtin(&mut registry);
        registry
    }

    /// Register `N` under the hash of its type name. Returns the hash.
    ///
    /// # Panics
    ///
    /// Panics if a different type name already hashes to the same value.
    pub fn register<N: Node + Default>(&mut self) -> u64 {
        let name = N::default().type_name();
        let hash = type_hash(name);
        if let Some(existing) = self.entries.get(&hash) {
            assert_eq!(
                existing.name, name,
                "type hash collision between {} and {}",
                existing.name, name
            );
        }
        self.entries.insert(
            hash,
            Entry {
                name,
                factory: make::<N>,
            },
        );
        debug!(type_name = name, hash, "node type registered");
        hash
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn create(&self, hash: u64) -> GraphResult<Box<dyn Node>> {
        self.entries
            .get(&hash)
            .map(|entry| (entry.factory)())
            .ok_or(GraphError::UnknownNodeType(hash))
    }

    pub fn create_named(&self, name: &str) -> GraphResult<Box<dyn Node>> {
        self.create(type_hash(name))
    }

    pub fn name(&self, hash: u64) -> Option<&'static str> {
        self.entries.get(&hash).map(|entry| entry.name)
    }

    /// Kinds of the top-level pins a fresh instance declares.
    pub fn pin_kinds(&self, hash: u64) -> GraphResult<PinKinds> {
        let node = self.create(hash)?;
        Ok(PinKinds {
            inputs: node.inputs().iter().map(|spec| spec.kind).collect(),
            outputs: node.outputs().iter().map(|spec| spec.kind).collect(),
        })
    }

    /// `(hash, name)` of every registered type, sorted by name.
    pub fn entries(&self) -> Vec<(u64, &'static str)> {
        self.entries
            .iter()
            .map(|(hash, entry)| (*hash, entry.name))
            .sorted_by_key(|(_, name)| *name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(type_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(type_hash("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(type_hash("foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn unknown_hash_is_an_error() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.create(42),
            Err(GraphError::UnknownNodeType(42))
        ));
    }
}
