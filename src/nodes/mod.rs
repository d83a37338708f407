//! Built-in utility nodes.

mod constant;
mod event_input;
mod select;
mod sum;
mod tone;

pub use constant::Constant;
pub use event_input::{EventInput, EventSender};
pub use select::Select;
pub use sum::Sum;
pub use tone::{Tone, ToneMessage, ToneProcessor};

use crate::registry::NodeRegistry;

/// Add every built-in node type to `registry`.
pub fn register_builtin(registry: &mut NodeRegistry) {
    registry.register::<Constant>();
    registry.register::<Sum>();
    registry.register::<Select>();
    registry.register::<EventInput>();
    registry.register::<Tone>();
}
