//! Typed dataflow graph engine.
//!
//! Nodes expose typed input and output pins. Connecting an output to an
//! input caches a converter between their value kinds; pushing values
//! through an output converts them straight into each connected input's
//! storage, honouring stride, offset and the input's push pattern. The graph
//! keeps a topological update order current as connections change, tracks
//! which nodes are dirty, and runs a per-frame pass that updates only what is
//! needed.
//!
//! Audio-capable nodes hand a processor to an [`AudioRenderer`] living on the
//! audio thread through a lock-free command ring.
//!
//! ```
//! use pinflow::{Graph, UpdateParams};
//! use pinflow::nodes::Constant;
//!
//! let mut graph = Graph::new();
//! let a = graph.add_node(Constant::new(3.5));
//! let b = graph.add_node(Constant::new(0.0));
//!
//! let (out, target) = (graph.outputs(a)[0], graph.inputs(b)[0]);
//! graph.connect(out, target).unwrap();
//!
//! graph.update(&mut UpdateParams::new(), &[b]);
//! assert_eq!(graph.read_input::<f32>(target, 0, 0), Some(3.5));
//! ```

pub mod audio;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod context;
#[cfg(feature = "cpal_output")]
pub mod device;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod nodes;
mod order;
pub mod pin;
pub mod push;
pub mod registry;
pub mod snapshot;
pub mod value;

pub use audio::{AudioProcessor, AudioRenderer, ProcessContext};
pub use buffer::{BufferLayout, BufferView, BufferViewMut, PinBuffer};
pub use config::GraphConfig;
pub use connection::Connection;
pub use context::{FrameScratch, NodeContext, UpdateParams};
#[cfg(feature = "cpal_output")]
pub use device::{CpalDevice, CpalOutput, OutputError};
pub use error::{GraphError, GraphResult};
pub use graph::{Adjacency, Graph};
pub use id::{IdAllocator, NodeId, PinId};
pub use node::{DirtyHandle, DrawContext, Drawable, Node, NodeFlags, NodeInfo, ORDER_INVALID};
pub use pin::{
    Direction, Event, EventQueue, InputPin, NoteEvent, OutputPin, PinCallback, PinFlags, PinInfo,
    PinSignal, PinSpec, PinStorage,
};
pub use push::{PushPattern, PushPatternId, PushPatterns};
pub use registry::{type_hash, NodeRegistry, PinKinds};
pub use snapshot::{GraphSnapshot, NodeSnapshot, PinSnapshot};
pub use value::{ResourceHandle, Scalar, ValueKind};
