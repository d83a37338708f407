//! A live binding from one output pin to one input pin.

use crate::id::{NodeId, PinId};
use crate::value::{convert_many, convert_single, ElementConverter, StridedConverter, ValueKind};

/// Connection between an output and an input, stored in the output pin's
/// connection list.
///
/// Holds only ids; both endpoints are re-resolved through the graph on every
/// push, so moving pin storage never leaves a dangling reference behind. The
/// cached converters depend on the kinds and channel counts of both sides and
/// are rebuilt whenever either changes.
#[derive(Clone, Copy, Debug)]
pub struct Connection {
    pub(crate) output: PinId,
    pub(crate) output_node: NodeId,
    pub(crate) input: PinId,
    pub(crate) input_node: NodeId,
    pub(crate) feedback: bool,
    pub(crate) single: Option<ElementConverter>,
    pub(crate) many: Option<StridedConverter>,
}

impl Connection {
    pub(crate) fn new(
        (output, output_node): (PinId, NodeId),
        (input, input_node): (PinId, NodeId),
        feedback: bool,
    ) -> Self {
        Self {
            output,
            output_node,
            input,
            input_node,
            feedback,
            single: None,
            many: None,
        }
    }

    /// Recompute the cached converters for the given endpoint kinds.
    ///
    /// Returns `false` when the kinds are no longer convertible. Flow and
    /// event links carry no converter and always succeed.
    pub(crate) fn rebuild(&mut self, src: ValueKind, src_coords: usize, dst: ValueKind) -> bool {
        match (src, dst) {
            (ValueKind::Flow, ValueKind::Flow) | (ValueKind::Events, ValueKind::Events) => {
                self.single = None;
                self.many = None;
                true
            }
            _ => {
                self.single = convert_single(src, dst);
                self.many = convert_many(src, src_coords, dst);
                self.single.is_some() && self.many.is_some()
            }
        }
    }

    pub fn output(&self) -> PinId {
        self.output
    }

    pub fn output_node(&self) -> NodeId {
        self.output_node
    }

    pub fn input(&self) -> PinId {
        self.input
    }

    pub fn input_node(&self) -> NodeId {
        self.input_node
    }

    /// Feedback links close loops and are ignored by update ordering.
    pub fn is_feedback(&self) -> bool {
        self.feedback
    }

    pub fn single(&self) -> Option<ElementConverter> {
        self.single
    }

    pub fn strided(&self) -> Option<StridedConverter> {
        self.many
    }
}
