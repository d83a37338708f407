use std::any::Any;

use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::trace;

use crate::context::NodeContext;
use crate::graph::Graph;
use crate::id::NodeId;
use crate::node::{DirtyHandle, Node, NodeFlags};
use crate::pin::{Event, PinSpec};

const DEFAULT_CAPACITY: usize = 64;

/// Brings events produced on another thread (device listeners, network)
/// into the graph.
///
/// The worker side holds an [`EventSender`]; every send marks this node
/// dirty, and the frame pass forwards whatever arrived to the `events`
/// output.
pub struct EventInput {
    incoming: Consumer<Event>,
    /// Producer half until a sender is handed out.
    producer: Option<Producer<Event>>,
}

impl EventInput {
    /// Node holding both ends of its ring; take the sender with
    /// [`EventInput::sender`] once the node is in a graph.
    pub fn new(capacity: usize) -> Self {
        let (producer, incoming) = RingBuffer::new(capacity.max(1));
        Self {
            incoming,
            producer: Some(producer),
        }
    }

    /// Add a new input node to `graph` and return it with its sender.
    pub fn attach(graph: &mut Graph, capacity: usize) -> (NodeId, EventSender) {
        let (producer, incoming) = RingBuffer::new(capacity.max(1));
        let id = graph.add_node(Self {
            incoming,
            producer: None,
        });
        let dirty = graph.core.node(id).dirty_handle();
        (id, EventSender { producer, dirty })
    }

    /// Take the sender of an input node already in `graph`, e.g. one
    /// created by the registry while restoring a snapshot.
    ///
    /// `None` if `node` is not an event input or its sender was already
    /// taken.
    pub fn sender(graph: &mut Graph, node: NodeId) -> Option<EventSender> {
        let dirty = graph.dirty_handle(node)?;
        let input = graph.node_mut(node)?.as_any_mut()?.downcast_mut::<EventInput>()?;
        let producer = input.producer.take()?;
        Some(EventSender { producer, dirty })
    }
}

impl Default for EventInput {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Node for EventInput {
    fn type_name(&self) -> &'static str {
        "event_input"
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags::UPDATES_EVERY_FRAME
    }

    fn outputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::events("events")]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        let mut batch = ctx.scratch().lease();
        while let Ok(event) = self.incoming.pop() {
            batch.push(event);
        }
        if !batch.is_empty() {
            trace!(node = %ctx.node(), count = batch.len(), "forwarding events");
            // overflowing queues are logged by the graph; the rest got the batch
            let _ = ctx.push_events(0, &batch);
        }
        ctx.scratch().release(batch);
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

/// Worker-thread half of an [`EventInput`].
pub struct EventSender {
    producer: Producer<Event>,
    dirty: DirtyHandle,
}

impl EventSender {
    /// Queue `event` for the next frame. Hands it back when the ring is
    /// full.
    pub fn send(&mut self, event: Event) -> Result<(), Event> {
        match self.producer.push(event) {
            Ok(()) => {
                self.dirty.set_dirty();
                Ok(())
            }
            Err(PushError::Full(event)) => Err(event),
        }
    }

    /// Free slots left in the ring.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    pub fn node(&self) -> NodeId {
        self.dirty.node()
    }
}
