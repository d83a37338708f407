//! Build a small graph, run a few frames and print its snapshot.
//!
//! Run with: cargo run --example frame_loop
//!
//! Set `RUST_LOG=pinflow=debug` to watch connections and order updates.

use std::time::Duration;

use pinflow::nodes::{Constant, Select, Sum};
use pinflow::{Graph, UpdateParams};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut graph = Graph::new();
    let a = graph.add_node(Constant::new(1.5));
    let b = graph.add_node(Constant::new(2.0));
    let sum = graph.add_node(Sum::new(2));
    let select = graph.add_node(Select);

    let terms = graph.pin_children(graph.inputs(sum)[0]).to_vec();
    graph.connect(graph.outputs(a)[0], terms[0]).unwrap();
    graph.connect(graph.outputs(b)[0], terms[1]).unwrap();
    graph.connect(graph.outputs(sum)[0], graph.inputs(select)[0]).unwrap();

    let mut params = UpdateParams::new();
    for frame in 0..4 {
        let value = graph.inputs(a)[0];
        graph.write_input(value, 0, 0, 1.5 + frame as f32);
        graph.update(&mut params, &[select]);

        let total = graph.read_input::<f32>(graph.inputs(select)[0], 0, 0).unwrap_or_default();
        println!("frame {}: sum = {}", params.frame, total);
        params.advance(Duration::from_millis(16));
    }

    for node in graph.node_ids() {
        println!("{:>12} order {}", graph.node_info(node).map(|i| i.name).unwrap_or_default(), graph.update_order(node));
    }

    let snapshot = graph.snapshot();
    match serde_json::to_string_pretty(&snapshot) {
        Ok(text) => println!("{}", text),
        Err(err) => eprintln!("snapshot failed: {}", err),
    }
}
