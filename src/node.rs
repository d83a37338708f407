//! Core node trait, flags and per-node graph state.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use petgraph::stable_graph::NodeIndex;

use crate::audio::AudioProcessor;
use crate::context::NodeContext;
use crate::id::{NodeId, PinId};
use crate::pin::PinSpec;

/// Scheduling flags of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Appended to the draw list when visited.
    pub const VISUAL: NodeFlags = NodeFlags(1 << 0);
    /// Updated every time it is visited, dirty or not.
    pub const UPDATES_OVER_TIME: NodeFlags = NodeFlags(1 << 1);
    /// Updated at the start of each frame when something dirtied it from
    /// outside the graph (worker thread, callback).
    pub const UPDATES_EVERY_FRAME: NodeFlags = NodeFlags(1 << 2);
    /// Owns an [`AudioProcessor`] running on the audio thread.
    pub const PROCESSES_AUDIO: NodeFlags = NodeFlags(1 << 3);

    #[inline]
    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

/// Information available while drawing.
#[derive(Clone, Copy, Debug)]
pub struct DrawContext {
    pub node: NodeId,
    /// Position in this frame's draw list.
    pub index: usize,
    pub frame: u64,
}

/// Capability of nodes that render something each frame.
pub trait Drawable {
    fn draw(&mut self, ctx: &DrawContext);
}

/// A unit of computation in the graph.
///
/// Implement this trait to create custom nodes. A node declares its static
/// pins up front; the graph assigns them ids in declaration order, so
/// `ctx.input(0)` is the first entry of [`inputs`](Node::inputs).
///
/// ```
/// use pinflow::{Node, NodeContext, PinSpec, ValueKind};
///
/// /// Doubles its input.
/// #[derive(Default)]
/// struct Double;
///
/// impl Node for Double {
///     fn type_name(&self) -> &'static str { "double" }
///
///     fn inputs(&self) -> Vec<PinSpec> {
///         vec![PinSpec::new("in", ValueKind::Float32)]
///     }
///
///     fn outputs(&self) -> Vec<PinSpec> {
///         vec![PinSpec::new("out", ValueKind::Float32)]
///     }
///
///     fn update(&mut self, ctx: &mut NodeContext<'_>) {
///         let x = ctx.read::<f32>(0).unwrap_or(0.0);
///         ctx.push(0, &[x * 2.0]);
///     }
/// }
/// ```
pub trait Node: Send + 'static {
    /// Registry key; also shown in editors.
    fn type_name(&self) -> &'static str;

    fn flags(&self) -> NodeFlags {
        NodeFlags::NONE
    }

    /// Static input pins.
    fn inputs(&self) -> Vec<PinSpec> {
        Vec::new()
    }

    /// Static output pins.
    fn outputs(&self) -> Vec<PinSpec> {
        Vec::new()
    }

    /// Recompute outputs from inputs. Called only from the graph's frame pass.
    fn update(&mut self, ctx: &mut NodeContext<'_>);

    /// Drawing capability, for [`NodeFlags::VISUAL`] nodes.
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        None
    }

    /// Audio capability, for [`NodeFlags::PROCESSES_AUDIO`] nodes.
    ///
    /// Called once when the node is added; the processor is moved to the
    /// audio thread and talks to the node only through channels the node
    /// set up itself.
    fn audio_processor(&mut self) -> Option<Box<dyn AudioProcessor>> {
        None
    }

    /// Concrete access for callers that know the node's type, e.g. to take
    /// a channel endpoint the node created.
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Marks one node dirty from any thread.
///
/// Only that node is marked; its descendants are invalidated when it updates
/// and pushes new values.
#[derive(Clone, Debug)]
pub struct DirtyHandle {
    node: NodeId,
    flag: Arc<AtomicBool>,
}

impl DirtyHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn set_dirty(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Order value of a node whose rank is not (yet) known.
pub const ORDER_INVALID: i32 = -1;

/// Graph-side state of a node.
#[derive(Debug)]
pub(crate) struct NodeState {
    pub(crate) id: NodeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: String,
    pub(crate) flags: NodeFlags,
    pub(crate) dirty: Arc<AtomicBool>,
    pub(crate) update_order: i32,
    pub(crate) index: NodeIndex,
    pub(crate) inputs: Vec<PinId>,
    pub(crate) outputs: Vec<PinId>,
}

impl NodeState {
    pub(crate) fn new(id: NodeId, type_name: &'static str, flags: NodeFlags, index: NodeIndex) -> Self {
        Self {
            id,
            type_name,
            name: type_name.to_owned(),
            flags,
            dirty: Arc::new(AtomicBool::new(true)),
            update_order: ORDER_INVALID,
            index,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub(crate) fn dirty_handle(&self) -> DirtyHandle {
        DirtyHandle {
            node: self.id,
            flag: self.dirty.clone(),
        }
    }

    pub(crate) fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id,
            type_name: self.type_name,
            name: self.name.clone(),
            flags: self.flags,
            update_order: self.update_order,
            dirty: self.is_dirty(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

/// Read-only snapshot of a node, for editors and serializers.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub type_name: &'static str,
    pub name: String,
    pub flags: NodeFlags,
    /// Topological rank, [`ORDER_INVALID`] when unknown.
    pub update_order: i32,
    pub dirty: bool,
    /// Top-level input pins (children not included).
    pub inputs: Vec<PinId>,
    pub outputs: Vec<PinId>,
}
