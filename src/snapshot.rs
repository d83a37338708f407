//! Saving and restoring a graph.
//!
//! A [`GraphSnapshot`] is plain data (serde), so applications pick the file
//! format. Restoring keeps every saved node and pin id; links are replayed
//! through [`Graph::connect`] and anything that no longer validates is
//! skipped with a warning.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::id::{IdAllocator, NodeId, PinId};
use crate::pin::{Direction, PinFlags, PinSpec, PinStorage};
use crate::registry::{type_hash, NodeRegistry};
use crate::value::ValueKind;

/// One pin and its value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub id: PinId,
    pub name: String,
    pub kind: ValueKind,
    pub num_coords: usize,
    pub element_count: usize,
    /// `(stride, offset)` when not packed.
    #[serde(default)]
    pub stride: Option<(usize, usize)>,
    pub flags: u8,
    /// Raw buffer contents of input pins; empty otherwise.
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub children: Vec<PinSnapshot>,
    /// Added after the node was created.
    #[serde(default)]
    pub dynamic: bool,
}

impl PinSnapshot {
    fn flags(&self) -> PinFlags {
        PinFlags::from_bits(self.flags)
    }

    fn is_vector(&self) -> bool {
        self.flags().contains(PinFlags::VECTOR)
    }

    /// Declaration that recreates this pin.
    fn spec(&self) -> PinSpec {
        let mut spec = PinSpec::new(&self.name, self.kind)
            .coords(self.num_coords)
            .count(self.element_count);
        spec.flags = self
            .flags()
            .without(PinFlags::INPUT | PinFlags::OUTPUT | PinFlags::DYNAMIC);
        spec.stride = self.stride;
        if !self.is_vector() {
            spec.children = self.children.iter().map(PinSnapshot::spec).collect();
        }
        spec
    }

    /// Ids of this pin tree in creation order.
    fn ids(&self, out: &mut Vec<PinId>) {
        out.push(self.id);
        for child in &self.children {
            child.ids(out);
        }
    }

    /// Reject anything that could not be recreated as a pin.
    fn check(&self, direction: Direction) -> Result<(), String> {
        if self.id.raw() == 0 || self.id.raw() == u64::MAX {
            return Err(format!("pin {:?} has an id outside the issued range", self.name));
        }
        if direction == Direction::Output && self.kind == ValueKind::Any {
            return Err(format!("output {} is a wildcard", self.id));
        }
        let sized = self.kind.has_storage() && self.kind != ValueKind::Any;
        if direction == Direction::Input && self.is_vector() && !sized {
            return Err(format!("vector input {} has unsized kind {:?}", self.id, self.kind));
        }
        if direction == Direction::Input && self.kind.has_storage() {
            let element = self
                .kind
                .size()
                .checked_mul(self.num_coords.max(1))
                .ok_or_else(|| format!("{} has too many channels", self.id))?;
            let (stride, offset) = self.stride.unwrap_or((element, 0));
            if offset.checked_add(element).map_or(true, |end| end > stride) {
                return Err(format!(
                    "{}: stride {} too small for offset {} + element size {}",
                    self.id, stride, offset, element
                ));
            }
            if stride.checked_mul(self.element_count).is_none() {
                return Err(format!("{} is too large", self.id));
            }
        }
        self.children.iter().try_for_each(|child| child.check(direction))
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a PinSnapshot)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    /// [`type_hash`] of the node's type name.
    pub type_hash: u64,
    pub name: String,
    pub inputs: Vec<PinSnapshot>,
    pub outputs: Vec<PinSnapshot>,
}

impl NodeSnapshot {
    fn pins(&self) -> impl Iterator<Item = &PinSnapshot> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

/// Everything needed to rebuild a graph, minus node-internal state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    /// `(output, input)` pairs.
    pub links: Vec<(PinId, PinId)>,
}

impl GraphSnapshot {
    /// Largest node or pin id in the snapshot, `0` when empty.
    pub fn max_id(&self) -> u64 {
        let mut max = 0;
        for node in &self.nodes {
            max = max.max(node.id.raw());
            for pin in node.pins() {
                pin.visit(&mut |p| max = max.max(p.id.raw()));
            }
        }
        max
    }

    /// Check that every node and pin could be recreated: ids unique and
    /// inside the issued range, pin layouts consistent.
    pub fn validate(&self) -> GraphResult<()> {
        self.check_unique_ids()?;
        for node in &self.nodes {
            if node.id.raw() == 0 || node.id.raw() == u64::MAX {
                return Err(GraphError::Snapshot(format!(
                    "node {:?} has an id outside the issued range",
                    node.name
                )));
            }
            let inputs = node.inputs.iter().map(|p| (p, Direction::Input));
            let outputs = node.outputs.iter().map(|p| (p, Direction::Output));
            for (pin, direction) in inputs.chain(outputs) {
                pin.check(direction).map_err(GraphError::Snapshot)?;
            }
        }
        Ok(())
    }

    fn check_unique_ids(&self) -> GraphResult<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.raw()) {
                return Err(GraphError::Snapshot(format!("id {} used twice", node.id.raw())));
            }
            let mut duplicate = None;
            for pin in node.pins() {
                pin.visit(&mut |p| {
                    if !seen.insert(p.id.raw()) && duplicate.is_none() {
                        duplicate = Some(p.id.raw());
                    }
                });
            }
            if let Some(id) = duplicate {
                return Err(GraphError::Snapshot(format!("id {} used twice", id)));
            }
        }
        Ok(())
    }
}

/// Pin ids for one declared pin tree, preferring the saved ones.
fn plan_ids(spec: &PinSpec, saved: Option<&PinSnapshot>, fresh: &IdAllocator, out: &mut Vec<PinId>) {
    out.push(saved.map(|s| s.id).unwrap_or_else(|| fresh.next_pin()));
    if spec.is_vector() {
        for index in 0..spec.element_count {
            let child = saved.and_then(|s| s.children.get(index));
            out.push(child.map(|c| c.id).unwrap_or_else(|| fresh.next_pin()));
        }
    } else {
        for (index, child) in spec.children.iter().enumerate() {
            plan_ids(child, saved.and_then(|s| s.children.get(index)), fresh, out);
        }
    }
}

impl Graph {
    /// Capture nodes, pins, literal values and links.
    ///
    /// Resource handles are not persisted; they are saved as null.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .node_ids()
            .into_iter()
            .map(|id| {
                let state = self.core.node(id);
                NodeSnapshot {
                    id,
                    type_hash: type_hash(state.type_name),
                    name: state.name.clone(),
                    inputs: state.inputs.iter().map(|p| self.pin_snapshot(*p)).collect(),
                    outputs: state.outputs.iter().map(|p| self.pin_snapshot(*p)).collect(),
                }
            })
            .collect();
        GraphSnapshot {
            nodes,
            links: self.links(),
        }
    }

    fn pin_snapshot(&self, pin: PinId) -> PinSnapshot {
        let info = self
            .core
            .pin_info(pin)
            .unwrap_or_else(|| panic!("{} listed on a node but missing", pin));
        let storage = self.core.inputs.get(&pin).map(|p| &p.storage);

        let (element_count, stride, bytes) = match storage {
            Some(PinStorage::Owned(buf)) => {
                let layout = buf.layout();
                let stride = (layout.stride != layout.element_size() || layout.offset != 0)
                    .then_some((layout.stride, layout.offset));
                let bytes = if info.kind == ValueKind::Resource {
                    vec![0; buf.bytes().len()]
                } else {
                    buf.bytes().to_vec()
                };
                (layout.element_count, stride, bytes)
            }
            _ if info.flags.contains(PinFlags::VECTOR) => (info.children.len(), None, Vec::new()),
            _ => (1, None, Vec::new()),
        };

        PinSnapshot {
            id: pin,
            name: info.name.clone(),
            kind: info.kind,
            num_coords: info.num_coords,
            element_count,
            stride,
            flags: info.flags.bits(),
            bytes,
            children: info.children.iter().map(|c| self.pin_snapshot(*c)).collect(),
            dynamic: info.flags.contains(PinFlags::DYNAMIC),
        }
    }

    /// Replace the graph's contents with `snapshot`.
    ///
    /// Node and pin ids are kept; the id allocator continues after the
    /// largest one. Nodes are created through `registry`, so every type in
    /// the snapshot must be registered; the graph is left untouched if one
    /// is not, or if [`GraphSnapshot::validate`] fails.
    pub fn restore(&mut self, snapshot: &GraphSnapshot, registry: &NodeRegistry) -> GraphResult<()> {
        snapshot.validate()?;
        if let Some(node) = snapshot.nodes.iter().find(|n| !registry.contains(n.type_hash)) {
            return Err(GraphError::UnknownNodeType(node.type_hash));
        }

        self.clear();
        let ids = self.core.ids.clone();
        ids.advance_past(snapshot.max_id());

        let mut nodes: Vec<&NodeSnapshot> = snapshot.nodes.iter().collect();
        nodes.sort_by_key(|n| n.id);

        for saved in &nodes {
            self.restore_node(saved, registry, &ids)?;
        }

        let mut skipped = 0;
        for &(output, input) in &snapshot.links {
            let valid = self.core.outputs.contains_key(&output) && self.core.inputs.contains_key(&input);
            if !valid {
                warn!(%output, %input, "link refers to a missing pin, skipped");
                skipped += 1;
                continue;
            }
            if let Err(err) = self.connect(output, input) {
                warn!(%output, %input, %err, "link no longer valid, skipped");
                skipped += 1;
            }
        }

        for saved in &nodes {
            for pin in saved.inputs.iter() {
                pin.visit(&mut |p| self.restore_value(p));
            }
        }

        ids.advance_past(snapshot.max_id());
        debug!(nodes = nodes.len(), links = snapshot.links.len(), skipped, "graph restored");
        Ok(())
    }

    fn restore_node(&mut self, saved: &NodeSnapshot, registry: &NodeRegistry, ids: &IdAllocator) -> GraphResult<()> {
        let node = registry.create(saved.type_hash)?;

        let mut plan = Vec::new();
        let static_inputs: Vec<&PinSnapshot> = saved.inputs.iter().filter(|p| !p.dynamic).collect();
        let static_outputs: Vec<&PinSnapshot> = saved.outputs.iter().filter(|p| !p.dynamic).collect();
        for (index, spec) in node.inputs().iter().enumerate() {
            plan_ids(spec, static_inputs.get(index).copied(), ids, &mut plan);
        }
        for (index, spec) in node.outputs().iter().enumerate() {
            plan_ids(spec, static_outputs.get(index).copied(), ids, &mut plan);
        }
        let mut plan = plan.into_iter();
        self.insert_node(node, saved.id, &mut || plan.next().unwrap_or_else(|| ids.next_pin()));
        self.set_node_name(saved.id, &saved.name)?;

        let dynamic = saved
            .inputs
            .iter()
            .filter(|p| p.dynamic)
            .map(|p| (p, Direction::Input))
            .chain(saved.outputs.iter().filter(|p| p.dynamic).map(|p| (p, Direction::Output)));
        for (pin, direction) in dynamic {
            let mut plan = Vec::new();
            pin.ids(&mut plan);
            let mut plan = plan.into_iter();
            self.core.add_pin(
                saved.id,
                pin.spec(),
                direction,
                &mut || plan.next().unwrap_or_else(|| ids.next_pin()),
            );
        }

        // vector sizes before values
        let mut vectors = Vec::new();
        for pin in saved.pins() {
            pin.visit(&mut |p| {
                if p.is_vector() {
                    vectors.push(p);
                }
            });
        }
        for saved_pin in vectors {
            let current = self
                .core
                .pin_info(saved_pin.id)
                .filter(|i| i.flags.contains(PinFlags::VECTOR))
                .map(|i| i.children.len());
            let Some(current) = current else {
                warn!(pin = %saved_pin.id, "vector pin not declared by node, skipped");
                continue;
            };
            if current == saved_pin.element_count {
                continue;
            }
            let mut plan = saved_pin
                .children
                .iter()
                .skip(current)
                .map(|c| c.id)
                .collect::<Vec<_>>()
                .into_iter();
            self.resize_vector_pin_with(
                saved_pin.id,
                saved_pin.element_count,
                &mut || plan.next().unwrap_or_else(|| ids.next_pin()),
            )?;
        }
        Ok(())
    }

    fn restore_value(&mut self, saved: &PinSnapshot) {
        if saved.bytes.is_empty() || saved.kind == ValueKind::Resource {
            return;
        }
        let Some(inp) = self.core.inputs.get_mut(&saved.id) else {
            return;
        };
        if let PinStorage::Owned(buf) = &mut inp.storage {
            if !buf.load_bytes(&saved.bytes) {
                warn!(pin = %saved.id, "saved value does not fit the pin, skipped");
            }
        }
    }
}
