use crate::context::NodeContext;
use crate::node::Node;
use crate::pin::PinSpec;
use crate::value::ValueKind;

/// Adds up the elements of its `terms` vector input.
///
/// Each element has its own child pin, so every term can be wired
/// separately; resizing the vector changes the number of terms.
#[derive(Debug)]
pub struct Sum {
    terms: usize,
}

impl Sum {
    pub fn new(terms: usize) -> Self {
        Self { terms }
    }
}

impl Default for Sum {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Node for Sum {
    fn type_name(&self) -> &'static str {
        "sum"
    }

    fn inputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::vector("terms", ValueKind::Float32, self.terms)]
    }

    fn outputs(&self) -> Vec<PinSpec> {
        vec![PinSpec::new("out", ValueKind::Float32)]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        let total: f32 = ctx
            .view(0)
            .and_then(|view| view.to_vec::<f32>())
            .map(|terms| terms.iter().sum())
            .unwrap_or_default();
        ctx.push(0, &[total]);
    }
}
