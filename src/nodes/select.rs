use crate::context::NodeContext;
use crate::node::Node;
use crate::pin::PinSpec;
use crate::value::ValueKind;

/// Writes its `value` into slot `slot` of every downstream input, leaving
/// the other slots alone.
#[derive(Debug, Default)]
pub struct Select;

impl Node for Select {
    fn type_name(&self) -> &'static str {
        "select"
    }

    fn inputs(&self) -> Vec<PinSpec> {
        vec![
            PinSpec::new("value", ValueKind::Float32),
            PinSpec::new("slot", ValueKind::UInt32).describe("destination element index"),
        ]
    }

    fn outputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::new("out", ValueKind::Float32)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        let value = ctx.read::<f32>(0).unwrap_or_default();
        let slot = ctx.read::<u32>(1).unwrap_or_default() as usize;
        ctx.push_single(0, &[value], slot);
    }
}
