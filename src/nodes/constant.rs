use crate::context::NodeContext;
use crate::node::Node;
use crate::pin::PinSpec;
use crate::value::ValueKind;

/// Outputs the float held by its `value` input.
///
/// The input is usually left unconnected and edited as a literal; it starts
/// at the value given to [`Constant::new`], so a snapshot taken before the
/// first frame already carries it. Any change (or a connection) makes the
/// node push again.
#[derive(Debug, Default)]
pub struct Constant {
    value: f32,
}

impl Constant {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Node for Constant {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn inputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::new("value", ValueKind::Float32).value(self.value)]
    }

    fn outputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::new("out", ValueKind::Float32)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        let value = ctx.read::<f32>(0).unwrap_or_default();
        ctx.push(0, &[value]);
    }
}
