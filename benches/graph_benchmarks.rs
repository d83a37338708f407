use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pinflow::nodes::{Constant, Sum};
use pinflow::{Graph, GraphConfig, IdAllocator, PinSpec, UpdateParams, ValueKind};

/// One constant feeding `width` sums, each feeding the next in a chain.
fn chain(width: usize) -> (Graph, Vec<pinflow::NodeId>) {
    let mut graph = Graph::with_allocator(GraphConfig::default(), IdAllocator::new());
    let source = graph.add_node(Constant::new(1.0));
    let mut prev = source;
    let mut nodes = vec![source];
    for _ in 0..width {
        let sum = graph.add_node(Sum::new(1));
        let term = graph.pin_children(graph.inputs(sum)[0])[0];
        graph.connect(graph.outputs(prev)[0], term).unwrap();
        nodes.push(sum);
        prev = sum;
    }
    (graph, nodes)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Graph::push() fan-out x64", |b| {
        let mut graph = Graph::with_allocator(GraphConfig::default(), IdAllocator::new());
        let source = graph.add_node(Constant::new(0.0));
        let out = graph.add_output_pin(source, PinSpec::new("xy", ValueKind::Float32).coords(2)).unwrap();
        for _ in 0..64 {
            let sink = graph.add_node(Sum::new(1));
            let pin = graph
                .add_input_pin(sink, PinSpec::new("points", ValueKind::Int32).coords(2).count(16))
                .unwrap();
            graph.connect(out, pin).unwrap();
        }
        let data: Vec<f32> = (0..32).map(|i| i as f32).collect();

        b.iter(|| graph.push(out, black_box(&data)))
    });

    c.bench_function("Graph::update() chain x256", |b| {
        let (mut graph, nodes) = chain(256);
        let root = nodes[nodes.len() - 1];
        let value = graph.inputs(nodes[0])[0];
        let mut params = UpdateParams::new();

        b.iter(|| {
            graph.write_input(value, 0, 0, black_box(2.0f32));
            params.advance(std::time::Duration::from_millis(16));
            graph.update(&mut params, &[root]);
        })
    });

    c.bench_function("Graph::connect() + disconnect()", |b| {
        let (mut graph, nodes) = chain(256);
        let tail = nodes[nodes.len() - 1];
        let head = graph.add_node(Sum::new(1));
        let term = graph.pin_children(graph.inputs(head)[0])[0];
        let out = graph.outputs(tail)[0];

        b.iter(|| {
            graph.connect(out, term).unwrap();
            graph.disconnect(out, term).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
