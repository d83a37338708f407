#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pinflow::{
    DrawContext, Drawable, Graph, GraphConfig, IdAllocator, Node, NodeContext, NodeFlags, NodeId,
    PinSpec,
};

/// Graph with its own id counter, so tests do not race on the global one.
pub fn graph() -> Graph {
    Graph::with_allocator(GraphConfig::default(), IdAllocator::new())
}

/// Shared log of which recorders updated or drew, in order.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Test node with arbitrary pins that records its updates.
pub struct Recorder {
    pub label: &'static str,
    pub inputs: Vec<PinSpec>,
    pub outputs: Vec<PinSpec>,
    pub flags: NodeFlags,
    pub updates: Arc<AtomicUsize>,
    pub log: Option<Log>,
}

impl Recorder {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: NodeFlags::NONE,
            updates: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    pub fn input(mut self, spec: PinSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: PinSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn logged(mut self, log: &Log) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.updates.clone()
    }
}

impl Node for Recorder {
    fn type_name(&self) -> &'static str {
        "recorder"
    }

    fn flags(&self) -> NodeFlags {
        self.flags
    }

    fn inputs(&self) -> Vec<PinSpec> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<PinSpec> {
        self.outputs.clone()
    }

    fn update(&mut self, _ctx: &mut NodeContext<'_>) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(format!("update {}", self.label));
        }
    }

    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl Drawable for Recorder {
    fn draw(&mut self, ctx: &DrawContext) {
        if let Some(log) = &self.log {
            log.push(format!("draw {} #{}", self.label, ctx.index));
        }
    }
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Connect output `out` of `from` to input `inp` of `to`.
pub fn wire(graph: &mut Graph, from: NodeId, out: usize, to: NodeId, inp: usize) -> bool {
    let (o, i) = (graph.outputs(from)[out], graph.inputs(to)[inp]);
    graph.connect(o, i).unwrap()
}
