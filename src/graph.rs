//! Graph manager - owns nodes, pins and adjacency, edits structure and drives
//! the per-frame update pass.

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction::{Incoming, Outgoing};
use tracing::{debug, trace, warn};

use crate::audio::{AudioBridge, AudioRenderer};
use crate::buffer::{BufferLayout, BufferView, BufferViewMut, PinBuffer};
use crate::config::GraphConfig;
use crate::connection::Connection;
use crate::context::{NodeContext, UpdateParams};
use crate::error::{GraphError, GraphResult};
use crate::id::{IdAllocator, NodeId, PinId};
use crate::node::{DirtyHandle, DrawContext, Node, NodeFlags, NodeInfo, NodeState, ORDER_INVALID};
use crate::pin::{
    Direction, Event, EventQueue, InputPin, OutputPin, PinCallback, PinFlags, PinInfo, PinSignal,
    PinSpec, PinStorage,
};
use crate::push::{PushPattern, PushPatternId, PushPatterns};
use crate::value::{kinds_compatible, write_element, Scalar, ValueKind};

/// Parent/child adjacency between two nodes: how many live connections run
/// from the parent's outputs to the child's inputs.
///
/// Several pin connections between the same two nodes share one edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    /// Ordinary connections; a nonzero count makes the parent "active".
    pub live: u32,
    /// Connections into feedback inputs; ignored by ordering.
    pub feedback: u32,
}

impl Adjacency {
    fn is_empty(&self) -> bool {
        self.live == 0 && self.feedback == 0
    }
}

/// Everything except node behaviour: lets a node's `update` run with full
/// access to pins while the node itself is borrowed separately.
pub(crate) struct GraphCore {
    pub(crate) ids: IdAllocator,
    pub(crate) config: GraphConfig,
    pub(crate) patterns: PushPatterns,
    pub(crate) nodes: HashMap<NodeId, NodeState>,
    pub(crate) inputs: HashMap<PinId, InputPin>,
    pub(crate) outputs: HashMap<PinId, OutputPin>,
    pub(crate) topology: StableDiGraph<NodeId, Adjacency>,
    byte_scratch: Vec<u8>,
    node_scratch: Vec<NodeId>,
}

fn input_view(inputs: &HashMap<PinId, InputPin>, pin: PinId) -> Option<BufferView<'_>> {
    match &inputs.get(&pin)?.storage {
        PinStorage::Owned(buf) => Some(buf.view()),
        PinStorage::Window { parent, index } => match &inputs.get(parent)?.storage {
            PinStorage::Owned(buf) => buf.element_view(*index),
            _ => None,
        },
        _ => None,
    }
}

fn input_view_mut(inputs: &mut HashMap<PinId, InputPin>, pin: PinId) -> Option<BufferViewMut<'_>> {
    let (owner, index) = match inputs.get(&pin)?.storage {
        PinStorage::Owned(_) => (pin, None),
        PinStorage::Window { parent, index } => (parent, Some(index)),
        _ => return None,
    };
    match (&mut inputs.get_mut(&owner)?.storage, index) {
        (PinStorage::Owned(buf), None) => Some(buf.view_mut()),
        (PinStorage::Owned(buf), Some(index)) => buf.element_view_mut(index),
        _ => None,
    }
}

impl GraphCore {
    fn new(config: GraphConfig, ids: IdAllocator) -> Self {
        let mut patterns = PushPatterns::new();
        if !patterns.set_default(&config.default_push_pattern) {
            warn!(pattern = %config.default_push_pattern, "unknown default push pattern, using one-to-one");
        }
        Self {
            ids,
            config,
            patterns,
            nodes: HashMap::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            topology: StableDiGraph::new(),
            byte_scratch: Vec::new(),
            node_scratch: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &NodeState {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("{} does not exist", id))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeState {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("{} does not exist", id))
    }

    pub(crate) fn pin_info(&self, pin: PinId) -> Option<&PinInfo> {
        self.inputs
            .get(&pin)
            .map(|p| &p.info)
            .or_else(|| self.outputs.get(&pin).map(|p| &p.info))
    }

    fn pin_info_mut(&mut self, pin: PinId) -> Option<&mut PinInfo> {
        if let Some(p) = self.inputs.get_mut(&pin) {
            return Some(&mut p.info);
        }
        self.outputs.get_mut(&pin).map(|p| &mut p.info)
    }

    fn input_pin(&self, pin: PinId) -> &InputPin {
        self.inputs
            .get(&pin)
            .unwrap_or_else(|| panic!("{} is not an input pin", pin))
    }

    fn output_pin(&self, pin: PinId) -> &OutputPin {
        self.outputs
            .get(&pin)
            .unwrap_or_else(|| panic!("{} is not an output pin", pin))
    }

    pub(crate) fn view(&self, pin: PinId) -> Option<BufferView<'_>> {
        input_view(&self.inputs, pin)
    }

    // -- pin creation --------------------------------------------------------

    pub(crate) fn create_pin(
        &mut self,
        owner: NodeId,
        spec: &PinSpec,
        direction: Direction,
        ids: &mut dyn FnMut() -> PinId,
    ) -> PinId {
        let id = ids();
        assert!(
            self.pin_info(id).is_none(),
            "{} is already in use, ids must be unique",
            id
        );
        let info = PinInfo::new(id, owner, spec, direction);

        match direction {
            Direction::Input => {
                if spec.is_vector() {
                    assert!(
                        spec.kind.has_storage() && spec.kind != ValueKind::Any,
                        "vector pin {} needs a sized value kind, got {:?}",
                        spec.name,
                        spec.kind
                    );
                }
                let storage = if spec.kind == ValueKind::Events {
                    let capacity = spec
                        .queue_capacity
                        .unwrap_or(self.config.default_event_capacity);
                    PinStorage::Queue(EventQueue::new(capacity))
                } else if spec.kind.has_storage() {
                    let mut buf = PinBuffer::new(spec.layout());
                    if let Some(initial) = &spec.initial {
                        if !buf.fill(initial) {
                            warn!(
                                pin = %id,
                                name = %spec.name,
                                "initial value does not match the pin kind"
                            );
                        }
                    }
                    PinStorage::Owned(buf)
                } else {
                    PinStorage::None
                };
                self.inputs.insert(
                    id,
                    InputPin {
                        info,
                        storage,
                        connection: None,
                        pattern: None,
                        pattern_pinned: false,
                    },
                );
            }
            Direction::Output => {
                assert!(
                    spec.kind != ValueKind::Any,
                    "output pin {} cannot be a wildcard",
                    spec.name
                );
                self.outputs.insert(
                    id,
                    OutputPin {
                        info,
                        connections: Vec::new(),
                    },
                );
            }
        }

        let children: Vec<PinId> = if spec.is_vector() {
            (0..spec.element_count)
                .map(|index| self.create_element_pin(id, index, direction, ids))
                .collect()
        } else {
            spec.children
                .iter()
                .map(|child| {
                    let child = self.create_pin(owner, child, direction, ids);
                    if let Some(info) = self.pin_info_mut(child) {
                        info.parent = Some(id);
                    }
                    child
                })
                .collect()
        };
        if let Some(info) = self.pin_info_mut(id) {
            info.children = children;
        }
        id
    }

    /// Child pin viewing element `index` of vector pin `parent`.
    fn create_element_pin(
        &mut self,
        parent: PinId,
        index: usize,
        direction: Direction,
        ids: &mut dyn FnMut() -> PinId,
    ) -> PinId {
        let (owner, spec) = {
            let info = self
                .pin_info(parent)
                .unwrap_or_else(|| panic!("{} does not exist", parent));
            let mut spec = PinSpec::new(&format!("{}[{}]", info.name, index), info.kind)
                .coords(info.num_coords)
                .describe(&info.description);
            spec.flags = info.flags.without(PinFlags::VECTOR | PinFlags::INPUT | PinFlags::OUTPUT);
            (info.owner, spec)
        };

        let id = ids();
        assert!(self.pin_info(id).is_none(), "{} is already in use", id);
        let mut info = PinInfo::new(id, owner, &spec, direction);
        info.parent = Some(parent);

        match direction {
            Direction::Input => {
                self.inputs.insert(
                    id,
                    InputPin {
                        info,
                        storage: PinStorage::Window { parent, index },
                        connection: None,
                        pattern: None,
                        pattern_pinned: false,
                    },
                );
            }
            Direction::Output => {
                self.outputs.insert(
                    id,
                    OutputPin {
                        info,
                        connections: Vec::new(),
                    },
                );
            }
        }
        id
    }

    /// All pins of a pin tree, root first.
    pub(crate) fn pin_tree(&self, root: PinId) -> Vec<PinId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(pin) = stack.pop() {
            if let Some(info) = self.pin_info(pin) {
                out.push(pin);
                stack.extend(info.children.iter().rev().copied());
            }
        }
        out
    }

    fn drop_pin_tree(&mut self, root: PinId) {
        for pin in self.pin_tree(root) {
            self.disconnect_all(pin);
        }
        for pin in self.pin_tree(root) {
            self.inputs.remove(&pin);
            self.outputs.remove(&pin);
        }
    }

    // -- adjacency -----------------------------------------------------------

    /// Live-edge reachability, used to reject cycles.
    fn reaches(&self, from: NodeIndex, to: NodeIndex) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            stack.extend(
                self.topology
                    .edges_directed(n, Outgoing)
                    .filter(|e| e.weight().live > 0)
                    .map(|e| e.target()),
            );
        }
        false
    }

    /// Count one more connection from `parent` to `child`. Returns `true` if
    /// the parent just became an active parent of the child.
    fn link_nodes(&mut self, parent: NodeId, child: NodeId, feedback: bool) -> bool {
        let (p, c) = (self.node(parent).index, self.node(child).index);
        let edge = match self.topology.find_edge(p, c) {
            Some(edge) => edge,
            None => self.topology.add_edge(p, c, Adjacency::default()),
        };
        let adjacency = &mut self.topology[edge];
        if feedback {
            adjacency.feedback += 1;
            false
        } else {
            adjacency.live += 1;
            adjacency.live == 1
        }
    }

    /// Count one connection less. Returns `true` if the parent stopped being
    /// an active parent of the child.
    fn unlink_nodes(&mut self, parent: NodeId, child: NodeId, feedback: bool) -> bool {
        let (p, c) = (self.node(parent).index, self.node(child).index);
        let edge = self
            .topology
            .find_edge(p, c)
            .unwrap_or_else(|| panic!("no adjacency between {} and {}", parent, child));
        let adjacency = &mut self.topology[edge];
        let removed_active = if feedback {
            assert!(adjacency.feedback > 0, "feedback count underflow");
            adjacency.feedback -= 1;
            false
        } else {
            assert!(adjacency.live > 0, "live count underflow");
            adjacency.live -= 1;
            adjacency.live == 0
        };
        if adjacency.is_empty() {
            self.topology.remove_edge(edge);
        }
        removed_active
    }

    pub(crate) fn active_parents(&self, node: NodeId) -> Vec<NodeId> {
        let index = self.node(node).index;
        self.topology
            .edges_directed(index, Incoming)
            .filter(|e| e.weight().live > 0)
            .map(|e| self.topology[e.source()])
            .collect()
    }

    pub(crate) fn active_children(&self, node: NodeId) -> Vec<NodeId> {
        let index = self.node(node).index;
        self.topology
            .edges_directed(index, Outgoing)
            .filter(|e| e.weight().live > 0)
            .map(|e| self.topology[e.target()])
            .collect()
    }

    fn adjacent(&self, node: NodeId, direction: petgraph::Direction) -> Vec<(NodeId, Adjacency)> {
        let index = self.node(node).index;
        self.topology
            .edges_directed(index, direction)
            .map(|e| {
                let other = match direction {
                    Incoming => e.source(),
                    Outgoing => e.target(),
                };
                (self.topology[other], *e.weight())
            })
            .sorted_by_key(|(id, _)| *id)
            .collect()
    }

    // -- connect / disconnect --------------------------------------------------

    pub(crate) fn connect(&mut self, output: PinId, input: PinId) -> GraphResult<bool> {
        let out = self.output_pin(output);
        let (src_kind, src_coords, out_node) = (out.info.kind, out.info.num_coords, out.info.owner);
        let inp = self.input_pin(input);
        let (dst_kind, in_node, feedback) = (inp.info.kind, inp.info.owner, inp.is_feedback());

        if inp.connection.is_some() {
            return Err(GraphError::AlreadyConnected { input });
        }
        if !kinds_compatible(src_kind, dst_kind) {
            return Err(GraphError::Incompatible {
                output,
                input,
                from: src_kind,
                to: dst_kind,
            });
        }
        if !feedback {
            let (from, to) = (self.node(in_node).index, self.node(out_node).index);
            if self.reaches(from, to) {
                return Err(GraphError::WouldCycle { output, input });
            }
        }

        let mut connection = Connection::new((output, out_node), (input, in_node), feedback);
        let converted = connection.rebuild(src_kind, src_coords, dst_kind);
        assert!(converted, "compatible kinds without a converter");

        let default_pattern = self.patterns.default_id();
        let inp = self
            .inputs
            .get_mut(&input)
            .unwrap_or_else(|| panic!("{} vanished", input));
        if dst_kind == ValueKind::Any {
            // wildcard adopts the source's element shape
            if let PinStorage::Owned(buf) = &mut inp.storage {
                let count = buf.layout().element_count;
                buf.relayout(BufferLayout::packed(src_kind, src_coords, count));
            }
        }
        inp.connection = Some(output);
        if !inp.pattern_pinned {
            inp.pattern = Some(default_pattern);
        }
        inp.info.signal(PinSignal::Connected {
            pin: input,
            peer: output,
        });

        let out = self
            .outputs
            .get_mut(&output)
            .unwrap_or_else(|| panic!("{} vanished", output));
        out.connections.push(connection);
        out.info.signal(PinSignal::Connected {
            pin: output,
            peer: input,
        });

        let created = self.link_nodes(out_node, in_node, feedback);
        debug!(%output, %input, %out_node, %in_node, created, "connected");

        if created {
            self.structure_changed(in_node);
        }
        self.set_dirty(in_node);
        Ok(created)
    }

    pub(crate) fn disconnect(&mut self, output: PinId, input: PinId) -> GraphResult<bool> {
        let out = self.output_pin(output);
        let position = out.connections.iter().position(|c| c.input == input);
        let inp = self.input_pin(input);
        let (Some(position), Some(source)) = (position, inp.connection) else {
            return Err(GraphError::NotConnected { output, input });
        };
        assert_eq!(
            source, output,
            "{} lists {} but the input points at {}",
            output, input, source
        );

        let out = self
            .outputs
            .get_mut(&output)
            .unwrap_or_else(|| panic!("{} vanished", output));
        let connection = out.connections.remove(position);
        out.info.signal(PinSignal::Disconnected {
            pin: output,
            peer: input,
        });

        let resource = self.input_pin(input).info.kind == ValueKind::Resource;
        if resource {
            // no handle to an externally owned object may outlive the link
            if let Some(mut view) = input_view_mut(&mut self.inputs, input) {
                view.zero();
            }
        }
        let inp = self
            .inputs
            .get_mut(&input)
            .unwrap_or_else(|| panic!("{} vanished", input));
        inp.connection = None;
        inp.info.signal(PinSignal::Disconnected {
            pin: input,
            peer: output,
        });

        let removed = self.unlink_nodes(
            connection.output_node,
            connection.input_node,
            connection.feedback,
        );
        debug!(%output, %input, removed, "disconnected");

        if removed {
            self.structure_changed(connection.input_node);
        }
        self.set_dirty(connection.input_node);
        Ok(removed)
    }

    /// Tear down every connection touching `pin` (not its children).
    pub(crate) fn disconnect_all(&mut self, pin: PinId) {
        if let Some(source) = self.inputs.get(&pin).and_then(|p| p.connection) {
            let _ = self.disconnect(source, pin);
        }
        let targets: Vec<PinId> = self
            .outputs
            .get(&pin)
            .map(|p| p.connections.iter().map(|c| c.input).collect())
            .unwrap_or_default();
        for target in targets {
            let _ = self.disconnect(pin, target);
        }
    }

    /// Rebuild the cached converters of every connection touching `pins`.
    ///
    /// Returns the links that are no longer convertible; the caller
    /// disconnects them.
    fn rebind(&mut self, pins: &[PinId]) -> Vec<(PinId, PinId)> {
        let mut links = Vec::new();
        for &pin in pins {
            if let Some(source) = self.inputs.get(&pin).and_then(|p| p.connection) {
                links.push((source, pin));
            }
            if let Some(out) = self.outputs.get(&pin) {
                links.extend(out.connections.iter().map(|c| (pin, c.input)));
            }
        }

        let mut broken = Vec::new();
        for (output, input) in links {
            let (src_kind, src_coords) = {
                let info = &self.output_pin(output).info;
                (info.kind, info.num_coords)
            };
            let dst_kind = self.input_pin(input).info.kind;
            let out = self
                .outputs
                .get_mut(&output)
                .unwrap_or_else(|| panic!("{} vanished", output));
            if let Some(connection) = out.connections.iter_mut().find(|c| c.input == input) {
                if !connection.rebuild(src_kind, src_coords, dst_kind) {
                    broken.push((output, input));
                }
            }
        }
        broken
    }

    // -- values ----------------------------------------------------------------

    /// Mark `node` and every node downstream of it dirty.
    pub(crate) fn set_dirty(&mut self, node: NodeId) {
        let mut seen = HashSet::new();
        let mut stack = vec![self.node(node).index];
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let id = self.topology[index];
            self.node(id).mark_dirty();
            stack.extend(self.topology.neighbors_directed(index, Outgoing));
        }
    }

    fn mark_targets_dirty(&mut self) {
        let mut targets = core::mem::take(&mut self.node_scratch);
        targets.sort_unstable();
        targets.dedup();
        for node in targets.drain(..) {
            self.set_dirty(node);
        }
        self.node_scratch = targets;
    }

    pub(crate) fn push_values<T: Scalar>(&mut self, output: PinId, data: &[T]) {
        let (kind, coords) = {
            let info = &self.output_pin(output).info;
            (info.kind, info.num_coords)
        };
        if kind == ValueKind::Flow {
            self.trigger(output);
            return;
        }
        assert_eq!(
            T::KIND, kind,
            "pushing {:?} values into {:?} output {}",
            T::KIND, kind, output
        );

        let mut bytes = core::mem::take(&mut self.byte_scratch);
        bytes.clear();
        bytes.resize(data.len() * kind.size(), 0);
        for (value, out) in data.iter().zip(bytes.chunks_exact_mut(kind.size())) {
            value.write(out);
        }
        self.push_bytes(output, &bytes, data.len() / coords);
        self.byte_scratch = bytes;
    }

    /// Push `count` raw elements (each `num_coords` channels of the output's
    /// kind) to every connected input.
    pub(crate) fn push_bytes(&mut self, output: PinId, bytes: &[u8], count: usize) {
        let kind = self.output_pin(output).info.kind;
        if kind == ValueKind::Flow {
            self.trigger(output);
            return;
        }
        assert!(
            kind != ValueKind::Events,
            "{} carries events, use push_events",
            output
        );

        let out = &self.outputs[&output];
        for connection in &out.connections {
            let Some(strided) = connection.many else {
                continue;
            };
            let Some(inp) = self.inputs.get_mut(&connection.input) else {
                continue;
            };
            let pattern = inp
                .pattern
                .map(|id| self.patterns.get(id))
                .unwrap_or(PushPattern::OneToOne);
            inp.info.signal(PinSignal::BeforeChange(connection.input));

            let written = match input_view_mut(&mut self.inputs, connection.input) {
                Some(mut view) => strided.apply(bytes, count, &mut view, pattern),
                None => 0,
            };
            trace!(%output, input = %connection.input, written, "push");

            if let Some(inp) = self.inputs.get_mut(&connection.input) {
                inp.info.signal(PinSignal::AfterChange(connection.input));
            }
            self.node_scratch.push(connection.input_node);
        }
        self.mark_targets_dirty();
    }

    /// Convert one element into slot `index` of every connected input.
    pub(crate) fn push_single_values<T: Scalar>(&mut self, output: PinId, element: &[T], index: usize) {
        let kind = self.output_pin(output).info.kind;
        assert_eq!(
            T::KIND, kind,
            "pushing {:?} values into {:?} output {}",
            T::KIND, kind, output
        );

        let mut bytes = core::mem::take(&mut self.byte_scratch);
        bytes.clear();
        bytes.resize(element.len() * kind.size(), 0);
        for (value, out) in element.iter().zip(bytes.chunks_exact_mut(kind.size())) {
            value.write(out);
        }

        let out = &self.outputs[&output];
        for connection in &out.connections {
            let Some(single) = connection.single else {
                continue;
            };
            if let Some(inp) = self.inputs.get_mut(&connection.input) {
                inp.info.signal(PinSignal::BeforeChange(connection.input));
            }
            let written = match input_view_mut(&mut self.inputs, connection.input) {
                Some(mut view) => write_element(single, kind.size(), &bytes, &mut view, index),
                None => false,
            };
            if !written {
                trace!(%output, input = %connection.input, index, "single push out of range");
            }
            if let Some(inp) = self.inputs.get_mut(&connection.input) {
                inp.info.signal(PinSignal::AfterChange(connection.input));
            }
            self.node_scratch.push(connection.input_node);
        }
        self.byte_scratch = bytes;
        self.mark_targets_dirty();
    }

    /// Append `events` to every connected event queue.
    ///
    /// A queue without room for the whole batch keeps nothing from it; the
    /// first such overflow is returned after the other queues were served.
    pub(crate) fn push_events(&mut self, output: PinId, events: &[Event]) -> GraphResult<()> {
        let out = self.output_pin(output);
        assert_eq!(
            out.info.kind,
            ValueKind::Events,
            "{} does not carry events",
            output
        );

        let mut result = Ok(());
        let out = &self.outputs[&output];
        for connection in &out.connections {
            let Some(inp) = self.inputs.get_mut(&connection.input) else {
                continue;
            };
            let PinStorage::Queue(queue) = &mut inp.storage else {
                continue;
            };
            if !queue.push_all(events) {
                let capacity = queue.capacity();
                warn!(input = %connection.input, capacity, dropped = events.len(), "event queue overflow");
                if result.is_ok() {
                    result = Err(GraphError::QueueFull {
                        pin: connection.input,
                        capacity,
                    });
                }
                continue;
            }
            inp.info.signal(PinSignal::AfterChange(connection.input));
            self.node_scratch.push(connection.input_node);
        }
        self.mark_targets_dirty();
        result
    }

    /// Fire a flow output: every connected input's callback is invoked.
    pub(crate) fn trigger(&mut self, output: PinId) {
        assert!(self.outputs.contains_key(&output), "{} is not an output pin", output);
        let out = &self.outputs[&output];
        for connection in &out.connections {
            if let Some(inp) = self.inputs.get_mut(&connection.input) {
                inp.info.signal(PinSignal::Triggered(connection.input));
            }
            self.node_scratch.push(connection.input_node);
        }
        self.mark_targets_dirty();
    }

    pub(crate) fn drain_events(&mut self, input: PinId) -> Vec<Event> {
        match self.inputs.get_mut(&input).map(|p| &mut p.storage) {
            Some(PinStorage::Queue(queue)) => queue.drain().collect(),
            _ => Vec::new(),
        }
    }

    /// Write one channel of an input and mark its node dirty.
    pub(crate) fn write_input<T: Scalar>(&mut self, input: PinId, element: usize, channel: usize, value: T) -> bool {
        let owner = self.input_pin(input).info.owner;
        let written = self.store_input(input, element, channel, value);
        if written {
            self.set_dirty(owner);
        }
        written
    }

    /// Write one channel of an input without touching dirty state.
    pub(crate) fn store_input<T: Scalar>(&mut self, input: PinId, element: usize, channel: usize, value: T) -> bool {
        if let Some(inp) = self.inputs.get_mut(&input) {
            inp.info.signal(PinSignal::BeforeChange(input));
        }
        let written = input_view_mut(&mut self.inputs, input)
            .map(|mut view| view.set(element, channel, value))
            .unwrap_or(false);
        if let Some(inp) = self.inputs.get_mut(&input) {
            inp.info.signal(PinSignal::AfterChange(input));
        }
        written
    }

    pub(crate) fn add_pin(
        &mut self,
        node: NodeId,
        mut spec: PinSpec,
        direction: Direction,
        ids: &mut dyn FnMut() -> PinId,
    ) -> PinId {
        spec.flags |= PinFlags::DYNAMIC;
        let pin = self.create_pin(node, &spec, direction, ids);
        let state = self.node_mut(node);
        match direction {
            Direction::Input => state.inputs.push(pin),
            Direction::Output => state.outputs.push(pin),
        }
        debug!(%node, %pin, name = %spec.name, "pin added");
        pin
    }
}

/// A dataflow graph: nodes, their typed pins, and the connections between
/// them.
///
/// All structural edits and the frame pass run on the thread that owns the
/// graph. Other threads interact through [`DirtyHandle`]s, node-owned
/// channels, and the [`AudioRenderer`].
///
/// ```
/// use pinflow::{Graph, UpdateParams};
/// use pinflow::nodes::{Constant, Sum};
///
/// let mut graph = Graph::new();
/// let a = graph.add_node(Constant::new(1.5));
/// let b = graph.add_node(Constant::new(2.0));
/// let sum = graph.add_node(Sum::new(2));
/// let terms = graph.pin_children(graph.inputs(sum)[0]).to_vec();
///
/// graph.connect(graph.outputs(a)[0], terms[0]).unwrap();
/// graph.connect(graph.outputs(b)[0], terms[1]).unwrap();
///
/// let mut params = UpdateParams::new();
/// graph.update(&mut params, &[sum]);
/// assert!(graph.update_order(sum) > graph.update_order(a));
/// assert_eq!(graph.read_input::<f32>(graph.inputs(sum)[0], 1, 0), Some(2.0));
/// ```
pub struct Graph {
    pub(crate) core: GraphCore,
    pub(crate) behaviors: HashMap<NodeId, Box<dyn Node>>,
    audio: AudioBridge,
    draw_list: Vec<NodeId>,
    frame: u64,
}

impl Graph {
    /// Empty graph with default settings, drawing ids from the process-wide
    /// allocator.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_allocator(config, IdAllocator::global())
    }

    /// Graph drawing ids from `ids` instead of the process-wide counter.
    pub fn with_allocator(config: GraphConfig, ids: IdAllocator) -> Self {
        let audio = AudioBridge::new(&config);
        Self {
            core: GraphCore::new(config, ids),
            behaviors: HashMap::new(),
            audio,
            draw_list: Vec::new(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.core.config
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.core.ids
    }

    pub fn patterns(&self) -> &PushPatterns {
        &self.core.patterns
    }

    pub fn patterns_mut(&mut self) -> &mut PushPatterns {
        &mut self.core.patterns
    }

    // -- nodes -------------------------------------------------------------

    /// Add a node, creating its static pins. Returns its id.
    pub fn add_node<N: Node>(&mut self, node: N) -> NodeId {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, node: Box<dyn Node>) -> NodeId {
        let ids = self.core.ids.clone();
        let id = ids.next_node();
        self.insert_node(node, id, &mut || ids.next_pin())
    }

    /// Insert `node` under `id`, drawing pin ids from `pin_ids` in
    /// declaration order (inputs first, depth-first through children).
    pub(crate) fn insert_node(
        &mut self,
        mut node: Box<dyn Node>,
        id: NodeId,
        pin_ids: &mut dyn FnMut() -> PinId,
    ) -> NodeId {
        assert!(!self.core.nodes.contains_key(&id), "{} already exists", id);

        let flags = node.flags();
        let index = self.core.topology.add_node(id);
        let mut state = NodeState::new(id, node.type_name(), flags, index);
        state.update_order = 0;
        self.core.nodes.insert(id, state);

        for spec in node.inputs() {
            let pin = self.core.create_pin(id, &spec, Direction::Input, pin_ids);
            self.core.node_mut(id).inputs.push(pin);
        }
        for spec in node.outputs() {
            let pin = self.core.create_pin(id, &spec, Direction::Output, pin_ids);
            self.core.node_mut(id).outputs.push(pin);
        }

        if flags.contains(NodeFlags::PROCESSES_AUDIO) {
            match node.audio_processor() {
                Some(processor) => self.audio.insert(id, processor),
                None => warn!(node = %id, "audio node did not provide a processor"),
            }
        }

        debug!(node = %id, type_name = node.type_name(), "node added");
        self.behaviors.insert(id, node);
        id
    }

    /// Disconnect every pin of `node`, then delete it.
    pub fn remove_node(&mut self, node: NodeId) -> GraphResult<()> {
        let state = self.core.nodes.get(&node).ok_or(GraphError::UnknownNode(node))?;
        let roots: Vec<PinId> = state.inputs.iter().chain(state.outputs.iter()).copied().collect();
        let audio = state.flags.contains(NodeFlags::PROCESSES_AUDIO);

        for root in roots {
            self.core.drop_pin_tree(root);
        }
        if audio {
            self.audio.remove(node);
        }

        let state = self.core.nodes.remove(&node).ok_or(GraphError::UnknownNode(node))?;
        assert!(
            self.core
                .topology
                .neighbors_undirected(state.index)
                .next()
                .is_none(),
            "{} still adjacent after disconnecting all pins",
            node
        );
        self.core.topology.remove_node(state.index);
        self.behaviors.remove(&node);
        self.draw_list.retain(|id| *id != node);
        debug!(%node, "node removed");
        Ok(())
    }

    /// Remove every node.
    ///
    /// Id allocation restarts from 1 only when no other graph draws from
    /// the same allocator.
    pub fn clear(&mut self) {
        for node in self.node_ids() {
            let _ = self.remove_node(node);
        }
        if !self.core.ids.is_shared() {
            self.core.ids.reset();
        }
        self.draw_list.clear();
        debug!("graph cleared");
    }

    pub fn set_node_name(&mut self, node: NodeId, name: &str) -> GraphResult<()> {
        let state = self.core.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))?;
        state.name = name.to_owned();
        Ok(())
    }

    /// Borrow a node's behaviour, e.g. to downcast in an editor.
    pub fn node(&self, node: NodeId) -> Option<&dyn Node> {
        self.behaviors.get(&node).map(|b| b.as_ref())
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut (dyn Node + 'static)> {
        self.behaviors.get_mut(&node).map(|b| b.as_mut())
    }

    // -- connections ---------------------------------------------------------

    /// Connect `output` to `input`.
    ///
    /// Returns whether a new parent/child adjacency was created (and the
    /// update order recomputed).
    ///
    /// # Errors
    ///
    /// Fails if the input already has a connection, the kinds are not
    /// convertible, or the link would close a loop through non-feedback pins.
    ///
    /// # Panics
    ///
    /// Panics if `output` is not an output pin or `input` not an input pin.
    pub fn connect(&mut self, output: PinId, input: PinId) -> GraphResult<bool> {
        self.core.connect(output, input)
    }

    /// Remove the connection from `output` to `input`.
    ///
    /// Returns whether the parent/child adjacency disappeared (and the
    /// update order was recomputed). Fails with
    /// [`GraphError::NotConnected`] if the pair is not linked, so a second
    /// call reports the error without touching anything.
    pub fn disconnect(&mut self, output: PinId, input: PinId) -> GraphResult<bool> {
        self.core.disconnect(output, input)
    }

    /// Tear down every connection of `pin`.
    pub fn disconnect_pin(&mut self, pin: PinId) -> GraphResult<()> {
        if self.core.pin_info(pin).is_none() {
            return Err(GraphError::UnknownPin(pin));
        }
        self.core.disconnect_all(pin);
        Ok(())
    }

    /// Override the push pattern of an input pin.
    pub fn set_push_pattern(&mut self, input: PinId, pattern: PushPatternId) -> GraphResult<()> {
        // validates the id, unregistered ids are fatal
        self.core.patterns.get(pattern);
        let inp = self.core.inputs.get_mut(&input).ok_or(GraphError::UnknownPin(input))?;
        inp.pattern = Some(pattern);
        inp.pattern_pinned = true;
        Ok(())
    }

    pub fn set_pin_callback(&mut self, pin: PinId, callback: PinCallback) -> GraphResult<()> {
        let info = self.core.pin_info_mut(pin).ok_or(GraphError::UnknownPin(pin))?;
        info.callback = Some(callback);
        Ok(())
    }

    // -- values --------------------------------------------------------------

    /// Push values out of `output`: each connected input receives them
    /// converted to its own kind, honouring its stride and offset.
    ///
    /// `data` holds `num_coords` channels per element, element-major.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the output's kind.
    pub fn push<T: Scalar>(&mut self, output: PinId, data: &[T]) {
        self.core.push_values(output, data);
    }

    /// Push `count` raw elements of the output's own kind.
    pub fn push_bytes(&mut self, output: PinId, bytes: &[u8], count: usize) {
        self.core.push_bytes(output, bytes, count);
    }

    /// Push one element into slot `index` of every connected input.
    pub fn push_single<T: Scalar>(&mut self, output: PinId, element: &[T], index: usize) {
        self.core.push_single_values(output, element, index);
    }

    pub fn push_events(&mut self, output: PinId, events: &[Event]) -> GraphResult<()> {
        self.core.push_events(output, events)
    }

    /// Fire a flow output.
    pub fn trigger(&mut self, output: PinId) {
        self.core.trigger(output);
    }

    /// Set one channel of an input pin, as an editor does for unconnected
    /// inputs. Returns `false` if out of range or mistyped.
    pub fn write_input<T: Scalar>(&mut self, input: PinId, element: usize, channel: usize, value: T) -> bool {
        if !self.core.inputs.contains_key(&input) {
            return false;
        }
        self.core.write_input(input, element, channel, value)
    }

    /// Read one channel of an input pin.
    pub fn read_input<T: Scalar>(&self, input: PinId, element: usize, channel: usize) -> Option<T> {
        self.core.view(input)?.get(element, channel)
    }

    pub fn input_view(&self, input: PinId) -> Option<BufferView<'_>> {
        self.core.view(input)
    }

    /// Events waiting in an event-queue input.
    pub fn queued_events(&self, input: PinId) -> Vec<Event> {
        self.core
            .inputs
            .get(&input)
            .and_then(|p| p.queue())
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    // -- dirty -----------------------------------------------------------------

    /// Mark `node` and all its descendants dirty.
    pub fn set_dirty(&mut self, node: NodeId) -> GraphResult<()> {
        if !self.core.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        self.core.set_dirty(node);
        Ok(())
    }

    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.core.nodes.get(&node).map(|n| n.is_dirty()).unwrap_or(false)
    }

    /// Handle that lets another thread mark `node` dirty.
    pub fn dirty_handle(&self, node: NodeId) -> Option<DirtyHandle> {
        self.core.nodes.get(&node).map(|n| n.dirty_handle())
    }

    // -- dynamic pins --------------------------------------------------------

    pub fn add_input_pin(&mut self, node: NodeId, spec: PinSpec) -> GraphResult<PinId> {
        if !self.core.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        let ids = self.core.ids.clone();
        Ok(self.core.add_pin(node, spec, Direction::Input, &mut || ids.next_pin()))
    }

    pub fn add_output_pin(&mut self, node: NodeId, spec: PinSpec) -> GraphResult<PinId> {
        if !self.core.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        let ids = self.core.ids.clone();
        Ok(self.core.add_pin(node, spec, Direction::Output, &mut || ids.next_pin()))
    }

    /// Remove a dynamically added pin, disconnecting it (and its children)
    /// first.
    ///
    /// # Panics
    ///
    /// Panics if the pin is one of the node's static pins.
    pub fn remove_pin(&mut self, pin: PinId) -> GraphResult<()> {
        let info = self.core.pin_info(pin).ok_or(GraphError::UnknownPin(pin))?;
        assert!(
            info.flags.contains(PinFlags::DYNAMIC) && info.parent.is_none(),
            "{} is not a dynamic top-level pin",
            pin
        );
        let owner = info.owner;
        self.core.drop_pin_tree(pin);
        let state = self.core.node_mut(owner);
        state.inputs.retain(|p| *p != pin);
        state.outputs.retain(|p| *p != pin);
        debug!(%pin, node = %owner, "pin removed");
        Ok(())
    }

    /// Resize a vector pin to `len` elements.
    ///
    /// Children beyond `len` are disconnected and destroyed, new children
    /// view the new elements, and every surviving connection into the pin or
    /// its children is re-bound to the moved storage.
    pub fn resize_vector_pin(&mut self, pin: PinId, len: usize) -> GraphResult<()> {
        let ids = self.core.ids.clone();
        self.resize_vector_pin_with(pin, len, &mut || ids.next_pin())
    }

    pub(crate) fn resize_vector_pin_with(
        &mut self,
        pin: PinId,
        len: usize,
        pin_ids: &mut dyn FnMut() -> PinId,
    ) -> GraphResult<()> {
        let info = self.core.pin_info(pin).ok_or(GraphError::UnknownPin(pin))?;
        assert!(info.flags.contains(PinFlags::VECTOR), "{} is not a vector pin", pin);
        let old = info.children.clone();
        let owner = info.owner;
        let direction = if info.is_input() {
            Direction::Input
        } else {
            Direction::Output
        };

        if len < old.len() {
            for &child in &old[len..] {
                self.core.drop_pin_tree(child);
            }
        }
        if let Some(inp) = self.core.inputs.get_mut(&pin) {
            if let PinStorage::Owned(buf) = &mut inp.storage {
                buf.resize(len);
            }
        }

        let mut children: Vec<PinId> = old.into_iter().take(len).collect();
        for index in children.len()..len {
            let child = self.core.create_element_pin(pin, index, direction, pin_ids);
            children.push(child);
        }
        if let Some(info) = self.core.pin_info_mut(pin) {
            info.children = children.clone();
        }

        let mut touched = children;
        touched.push(pin);
        for (output, input) in self.core.rebind(&touched) {
            let _ = self.core.disconnect(output, input);
        }

        self.core.set_dirty(owner);
        debug!(%pin, len, "vector pin resized");
        Ok(())
    }

    /// Change a pin's kind and channel count.
    ///
    /// Input storage is re-laid out (and zeroed); cached converters of every
    /// connection touching the pin are rebuilt. Connections that are no
    /// longer convertible are removed and returned.
    pub fn retype_pin(
        &mut self,
        pin: PinId,
        kind: ValueKind,
        num_coords: usize,
    ) -> GraphResult<Vec<(PinId, PinId)>> {
        let tree = {
            let info = self.core.pin_info(pin).ok_or(GraphError::UnknownPin(pin))?;
            assert!(
                !(info.is_output() && kind == ValueKind::Any),
                "output pin {} cannot be a wildcard",
                pin
            );
            if info.flags.contains(PinFlags::VECTOR) {
                self.core.pin_tree(pin)
            } else {
                vec![pin]
            }
        };
        let num_coords = num_coords.max(1);

        for &p in &tree {
            let default_capacity = self.core.config.default_event_capacity;
            // a connected wildcard takes the element shape of its source
            let shape = self
                .core
                .inputs
                .get(&p)
                .and_then(|inp| inp.connection)
                .and_then(|source| self.core.outputs.get(&source))
                .filter(|_| kind == ValueKind::Any)
                .map_or((kind, num_coords), |out| (out.info.kind, out.info.num_coords));
            if let Some(inp) = self.core.inputs.get_mut(&p) {
                inp.info.kind = kind;
                inp.info.num_coords = num_coords;
                match &mut inp.storage {
                    PinStorage::Window { .. } => {}
                    PinStorage::Owned(buf) if kind.has_storage() => {
                        let count = buf.layout().element_count;
                        buf.relayout(BufferLayout::packed(shape.0, shape.1, count));
                    }
                    storage => {
                        *storage = if kind == ValueKind::Events {
                            PinStorage::Queue(EventQueue::new(default_capacity))
                        } else if kind.has_storage() {
                            PinStorage::Owned(PinBuffer::new(BufferLayout::packed(shape.0, shape.1, 1)))
                        } else {
                            PinStorage::None
                        };
                    }
                }
            } else if let Some(out) = self.core.outputs.get_mut(&p) {
                out.info.kind = kind;
                out.info.num_coords = num_coords;
            }
        }

        let broken = self.core.rebind(&tree);
        for &(output, input) in &broken {
            let _ = self.core.disconnect(output, input);
        }
        let owner = self.core.pin_info(pin).map(|i| i.owner);
        if let Some(owner) = owner {
            self.core.set_dirty(owner);
        }
        debug!(%pin, ?kind, num_coords, dropped = broken.len(), "pin retyped");
        Ok(broken)
    }

    // -- frame ---------------------------------------------------------------

    /// Run one frame.
    ///
    /// 1. Clears the draw list and the frame scratch, settles the audio
    ///    handoff.
    /// 2. Updates every [`NodeFlags::UPDATES_EVERY_FRAME`] node that is
    ///    already dirty.
    /// 3. Visits each of `roots`: active parents first, then the node itself
    ///    if it is dirty or [`NodeFlags::UPDATES_OVER_TIME`]. Visual nodes
    ///    reached are appended to the draw list in visitation order.
    pub fn update(&mut self, params: &mut UpdateParams, roots: &[NodeId]) {
        self.draw_list.clear();
        params.scratch.reset();
        self.audio.collect_retired();
        self.audio.flush();
        self.frame = params.frame;

        let mut pass = FramePass {
            core: &mut self.core,
            behaviors: &mut self.behaviors,
            params: &mut *params,
            draw_list: &mut self.draw_list,
            visited: HashSet::new(),
            updated: 0,
        };

        let every_frame: Vec<NodeId> = pass
            .core
            .nodes
            .values()
            .filter(|n| n.flags.contains(NodeFlags::UPDATES_EVERY_FRAME) && n.is_dirty())
            .sorted_by_key(|n| (n.update_order, n.id))
            .map(|n| n.id)
            .collect();
        for node in every_frame {
            pass.run(node);
        }

        for &root in roots {
            if pass.core.nodes.contains_key(&root) {
                pass.visit(root);
            } else {
                warn!(node = %root, "update root does not exist");
            }
        }
        let updated = pass.updated;
        trace!(frame = params.frame, updated, drawn = self.draw_list.len(), "frame done");
    }

    /// Visual nodes collected by the last [`update`](Self::update), in
    /// drawing order.
    pub fn draw_list(&self) -> &[NodeId] {
        &self.draw_list
    }

    /// Call [`Drawable::draw`](crate::Drawable::draw) on the draw list.
    pub fn draw(&mut self) {
        for (index, &node) in self.draw_list.iter().enumerate() {
            let Some(behavior) = self.behaviors.get_mut(&node) else {
                continue;
            };
            if let Some(drawable) = behavior.as_drawable() {
                drawable.draw(&DrawContext {
                    node,
                    index,
                    frame: self.frame,
                });
            }
        }
    }

    /// Hand the audio side to the caller, once.
    pub fn take_audio_renderer(&mut self) -> Option<AudioRenderer> {
        self.audio.take_renderer()
    }

    /// Audio commands still waiting for room in the ring.
    pub fn pending_audio_commands(&self) -> usize {
        self.audio.pending()
    }

    // -- queries -------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.core.nodes.len()
    }

    /// All node ids, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.core.nodes.keys().copied().sorted().collect()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.core.nodes.contains_key(&node)
    }

    pub fn node_info(&self, node: NodeId) -> Option<NodeInfo> {
        self.core.nodes.get(&node).map(|n| n.info())
    }

    /// Top-level input pins of `node`, in declaration order.
    ///
    /// # Panics
    ///
    /// Panics if the node does not exist.
    pub fn inputs(&self, node: NodeId) -> &[PinId] {
        &self.core.node(node).inputs
    }

    pub fn outputs(&self, node: NodeId) -> &[PinId] {
        &self.core.node(node).outputs
    }

    /// Find a top-level pin of `node` by name.
    pub fn find_pin(&self, node: NodeId, name: &str) -> Option<PinId> {
        let state = self.core.nodes.get(&node)?;
        state
            .inputs
            .iter()
            .chain(state.outputs.iter())
            .copied()
            .find(|pin| self.core.pin_info(*pin).map(|i| i.name == name).unwrap_or(false))
    }

    pub fn pin_info(&self, pin: PinId) -> Option<&PinInfo> {
        self.core.pin_info(pin)
    }

    /// Child pins of `pin`: vector elements or struct fields.
    pub fn pin_children(&self, pin: PinId) -> &[PinId] {
        self.core
            .pin_info(pin)
            .map(|info| info.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn input_pin(&self, pin: PinId) -> Option<&InputPin> {
        self.core.inputs.get(&pin)
    }

    pub fn output_pin(&self, pin: PinId) -> Option<&OutputPin> {
        self.core.outputs.get(&pin)
    }

    /// Output feeding `input`, if any.
    pub fn connection_of(&self, input: PinId) -> Option<PinId> {
        self.core.inputs.get(&input).and_then(|p| p.connection)
    }

    /// Inputs fed by `output`.
    pub fn connections_of(&self, output: PinId) -> Vec<PinId> {
        self.core
            .outputs
            .get(&output)
            .map(|p| p.connections.iter().map(|c| c.input).collect())
            .unwrap_or_default()
    }

    /// Every live connection as `(output, input)`, sorted.
    pub fn links(&self) -> Vec<(PinId, PinId)> {
        self.core
            .outputs
            .values()
            .flat_map(|p| p.connections.iter().map(|c| (c.output, c.input)))
            .sorted()
            .collect()
    }

    /// Nodes with connections into `node`, with connection counts.
    pub fn parents(&self, node: NodeId) -> Vec<(NodeId, Adjacency)> {
        self.core.adjacent(node, Incoming)
    }

    /// Nodes `node` has connections into, with connection counts.
    pub fn children(&self, node: NodeId) -> Vec<(NodeId, Adjacency)> {
        self.core.adjacent(node, Outgoing)
    }

    /// Topological rank of `node`, [`ORDER_INVALID`] if unknown.
    pub fn update_order(&self, node: NodeId) -> i32 {
        self.core
            .nodes
            .get(&node)
            .map(|n| n.update_order)
            .unwrap_or(ORDER_INVALID)
    }

    /// Verify that adjacency, connection lists and input back-links agree,
    /// and that update order is consistent.
    ///
    /// # Panics
    ///
    /// Panics describing the first violation found.
    pub fn check_invariants(&self) {
        let core = &self.core;
        let mut tally: HashMap<(NodeId, NodeId), Adjacency> = HashMap::new();

        for (&pin, out) in &core.outputs {
            let mut seen = HashSet::new();
            for c in &out.connections {
                assert_eq!(c.output, pin, "connection stored on the wrong output");
                assert!(seen.insert(c.input), "{} lists {} twice", pin, c.input);
                let inp = core
                    .inputs
                    .get(&c.input)
                    .unwrap_or_else(|| panic!("{} links to missing input {}", pin, c.input));
                assert_eq!(inp.connection, Some(pin), "{} does not point back at {}", c.input, pin);
                assert_eq!(c.output_node, out.info.owner);
                assert_eq!(c.input_node, inp.info.owner);
                let entry = tally.entry((c.output_node, c.input_node)).or_default();
                if c.feedback {
                    entry.feedback += 1;
                } else {
                    entry.live += 1;
                }
            }
        }

        for (&pin, inp) in &core.inputs {
            if let Some(source) = inp.connection {
                let out = core
                    .outputs
                    .get(&source)
                    .unwrap_or_else(|| panic!("{} points at missing output {}", pin, source));
                let count = out.connections.iter().filter(|c| c.input == pin).count();
                assert_eq!(count, 1, "{} appears {} times on {}", pin, count, source);
            }
        }

        for edge in core.topology.edge_references() {
            let key = (core.topology[edge.source()], core.topology[edge.target()]);
            let expected = tally.remove(&key).unwrap_or_default();
            assert_eq!(*edge.weight(), expected, "adjacency {:?} disagrees with connections", key);
            assert!(!edge.weight().is_empty(), "empty adjacency {:?} left behind", key);
        }
        assert!(tally.is_empty(), "connections without adjacency: {:?}", tally);

        for state in core.nodes.values() {
            assert!(state.update_order >= 0, "{} has no update order", state.id);
            for parent in core.active_parents(state.id) {
                let parent_order = core.node(parent).update_order;
                assert!(
                    state.update_order > parent_order,
                    "{} (order {}) not after parent {} (order {})",
                    state.id,
                    state.update_order,
                    parent,
                    parent_order
                );
            }
            for pin in state.inputs.iter().chain(state.outputs.iter()) {
                for p in core.pin_tree(*pin) {
                    let info = core.pin_info(p).unwrap_or_else(|| panic!("{} missing", p));
                    assert_eq!(info.owner, state.id, "{} owned by the wrong node", p);
                }
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one frame's traversal.
struct FramePass<'a> {
    core: &'a mut GraphCore,
    behaviors: &'a mut HashMap<NodeId, Box<dyn Node>>,
    params: &'a mut UpdateParams,
    draw_list: &'a mut Vec<NodeId>,
    visited: HashSet<NodeId>,
    updated: usize,
}

impl FramePass<'_> {
    /// Depth-first over active parents, lowest order first; a node runs
    /// after all of its parents.
    fn visit(&mut self, root: NodeId) {
        let mut stack = vec![(root, false)];
        while let Some((node, parents_done)) = stack.pop() {
            if parents_done {
                self.finish(node);
                continue;
            }
            if !self.visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            let parents = self
                .core
                .active_parents(node)
                .into_iter()
                .sorted_by_key(|p| (self.core.node(*p).update_order, *p))
                .rev();
            stack.extend(parents.map(|parent| (parent, false)));
        }
    }

    fn finish(&mut self, node: NodeId) {
        let state = self.core.node(node);
        let flags = state.flags;
        if state.is_dirty() || flags.contains(NodeFlags::UPDATES_OVER_TIME) {
            self.run(node);
        }
        if flags.contains(NodeFlags::VISUAL) {
            self.draw_list.push(node);
        }
    }

    fn run(&mut self, node: NodeId) {
        // cleared first so anything re-dirtying it during update sticks
        self.core.node(node).clear_dirty();
        if let Some(behavior) = self.behaviors.get_mut(&node) {
            let mut ctx = NodeContext::new(node, self.core, self.params);
            behavior.update(&mut ctx);
            self.updated += 1;
            trace!(%node, "updated");
        }
    }
}
