//! Per-frame parameters and the context handed to [`Node::update`].
//!
//! [`Node::update`]: crate::Node::update

use std::time::Duration;

use crate::buffer::BufferView;
use crate::error::GraphResult;
use crate::graph::GraphCore;
use crate::id::{NodeId, PinId};
use crate::pin::{Direction, Event, PinSpec};
use crate::push::PushPatterns;
use crate::value::Scalar;

/// Reusable event buffers for nodes that need temporary storage during a
/// frame. Reset by the graph at the start of each frame.
#[derive(Debug, Default)]
pub struct FrameScratch {
    pool: Vec<Vec<Event>>,
    leased: usize,
}

impl FrameScratch {
    /// An empty buffer, reusing a released allocation when there is one.
    pub fn lease(&mut self) -> Vec<Event> {
        self.leased += 1;
        let mut buf = self.pool.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    pub fn release(&mut self, buf: Vec<Event>) {
        self.leased = self.leased.saturating_sub(1);
        self.pool.push(buf);
    }

    /// Buffers handed out and not yet returned.
    pub fn leased(&self) -> usize {
        self.leased
    }

    pub(crate) fn reset(&mut self) {
        self.leased = 0;
        for buf in self.pool.iter_mut() {
            buf.clear();
        }
    }
}

/// Timing of the frame being updated.
#[derive(Debug, Default)]
pub struct UpdateParams {
    /// Time since the first frame.
    pub time: Duration,
    /// Time since the previous frame.
    pub delta: Duration,
    pub frame: u64,
    pub scratch: FrameScratch,
}

impl UpdateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step to the next frame.
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.time += delta;
        self.frame += 1;
    }
}

/// What a node sees while it updates: its own pins and the frame timing.
///
/// Indices refer to the node's top-level pins in declaration order
/// (dynamic pins follow the static ones).
pub struct NodeContext<'a> {
    node: NodeId,
    core: &'a mut GraphCore,
    params: &'a mut UpdateParams,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(node: NodeId, core: &'a mut GraphCore, params: &'a mut UpdateParams) -> Self {
        Self { node, core, params }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn time(&self) -> Duration {
        self.params.time
    }

    pub fn delta(&self) -> Duration {
        self.params.delta
    }

    pub fn frame(&self) -> u64 {
        self.params.frame
    }

    pub fn scratch(&mut self) -> &mut FrameScratch {
        &mut self.params.scratch
    }

    pub fn patterns(&self) -> &PushPatterns {
        &self.core.patterns
    }

    /// # Panics
    ///
    /// Panics if the node has no input at `index`.
    pub fn input(&self, index: usize) -> PinId {
        self.core.node(self.node).inputs[index]
    }

    /// # Panics
    ///
    /// Panics if the node has no output at `index`.
    pub fn output(&self, index: usize) -> PinId {
        self.core.node(self.node).outputs[index]
    }

    pub fn input_count(&self) -> usize {
        self.core.node(self.node).inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.core.node(self.node).outputs.len()
    }

    pub fn find_input(&self, name: &str) -> Option<PinId> {
        self.core
            .node(self.node)
            .inputs
            .iter()
            .copied()
            .find(|pin| self.core.pin_info(*pin).map(|i| i.name == name).unwrap_or(false))
    }

    /// Child pins of one of this node's pins (vector elements, struct
    /// fields).
    pub fn children(&self, pin: PinId) -> &[PinId] {
        self.core
            .pin_info(pin)
            .map(|i| i.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, index: usize) -> bool {
        let pin = self.input(index);
        self.core
            .inputs
            .get(&pin)
            .map(|p| p.connection.is_some())
            .unwrap_or(false)
    }

    /// First channel of the first element of input `index`.
    pub fn read<T: Scalar>(&self, index: usize) -> Option<T> {
        self.read_pin(self.input(index), 0, 0)
    }

    /// All channels of one element of input `index`.
    pub fn read_element<T: Scalar>(&self, index: usize, element: usize) -> Option<Vec<T>> {
        self.core.view(self.input(index))?.element(element)
    }

    /// One channel of any input pin of this node, children included.
    pub fn read_pin<T: Scalar>(&self, pin: PinId, element: usize, channel: usize) -> Option<T> {
        self.core.view(pin)?.get(element, channel)
    }

    pub fn view(&self, index: usize) -> Option<BufferView<'_>> {
        self.core.view(self.input(index))
    }

    pub fn view_pin(&self, pin: PinId) -> Option<BufferView<'_>> {
        self.core.view(pin)
    }

    /// Set the literal held by input `index`, e.g. a value given at
    /// construction. Does not mark anything dirty.
    pub fn write_input<T: Scalar>(&mut self, index: usize, element: usize, channel: usize, value: T) -> bool {
        let pin = self.input(index);
        self.core.store_input(pin, element, channel, value)
    }

    /// Take every event waiting in input `index`.
    pub fn drain_events(&mut self, index: usize) -> Vec<Event> {
        let pin = self.input(index);
        self.core.drain_events(pin)
    }

    /// Push `data` out of output `index` to every connected input.
    pub fn push<T: Scalar>(&mut self, index: usize, data: &[T]) {
        let pin = self.output(index);
        self.core.push_values(pin, data);
    }

    /// Push out of any output pin of this node, children included.
    pub fn push_pin<T: Scalar>(&mut self, pin: PinId, data: &[T]) {
        debug_assert_eq!(
            self.core.pin_info(pin).map(|i| i.owner),
            Some(self.node),
            "{} does not belong to {}",
            pin,
            self.node
        );
        self.core.push_values(pin, data);
    }

    /// Write one element into slot `at` of every input connected to
    /// output `index`.
    pub fn push_single<T: Scalar>(&mut self, index: usize, element: &[T], at: usize) {
        let pin = self.output(index);
        self.core.push_single_values(pin, element, at);
    }

    pub fn push_events(&mut self, index: usize, events: &[Event]) -> GraphResult<()> {
        let pin = self.output(index);
        self.core.push_events(pin, events)
    }

    /// Fire flow output `index`.
    pub fn trigger(&mut self, index: usize) {
        let pin = self.output(index);
        self.core.trigger(pin);
    }

    pub fn add_input_pin(&mut self, spec: PinSpec) -> PinId {
        let ids = self.core.ids.clone();
        self.core
            .add_pin(self.node, spec, Direction::Input, &mut || ids.next_pin())
    }

    pub fn add_output_pin(&mut self, spec: PinSpec) -> PinId {
        let ids = self.core.ids.clone();
        self.core
            .add_pin(self.node, spec, Direction::Output, &mut || ids.next_pin())
    }

    /// Mark this node (and its descendants) dirty again, e.g. to be updated
    /// next frame.
    pub fn set_dirty(&mut self) {
        self.core.set_dirty(self.node);
    }
}
