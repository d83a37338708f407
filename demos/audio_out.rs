//! Play a tone whose pitch is driven by a graph node.
//!
//! Run with: cargo run --example audio_out --features cpal_output
//!
//! Lists available devices and lets you pick one, then glides a sine
//! through a few pitches.

use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use pinflow::nodes::{Constant, Tone};
use pinflow::{CpalDevice, Graph, GraphConfig, UpdateParams};

fn main() {
    tracing_subscriber::fmt::init();

    let devices = CpalDevice::list_outputs();
    if devices.is_empty() {
        eprintln!("No audio output devices found!");
        return;
    }

    println!("Available audio output devices:");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{}] {} ({}Hz, {} ch)",
            i,
            device.name(),
            device.sample_rate(),
            device.channels()
        );
    }

    print!("\nSelect device [0]: ");
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let choice: usize = input.trim().parse().unwrap_or(0);

    let device = devices.into_iter().nth(choice).unwrap_or_else(|| {
        println!("Invalid choice, using default device");
        CpalDevice::default_output().expect("No default device")
    });

    println!("\nUsing: {} @ {}Hz", device.name(), device.sample_rate());

    let mut graph = Graph::with_config(
        GraphConfig::default()
            .with_sample_rate(device.sample_rate())
            .with_channels(device.channels() as usize),
    );
    let pitch = graph.add_node(Constant::new(440.0));
    let tone = graph.add_node(Tone::new(440.0, 0.25));
    graph.connect(graph.outputs(pitch)[0], graph.inputs(tone)[0]).unwrap();

    let renderer = graph.take_audio_renderer().expect("renderer already taken");
    let output = device.start(renderer).expect("failed to start output");

    let mut params = UpdateParams::new();
    let pitch_value = graph.inputs(pitch)[0];
    for frequency in [440.0f32, 554.37, 659.25, 880.0] {
        println!("Playing {}Hz", frequency);
        graph.write_input(pitch_value, 0, 0, frequency);
        for _ in 0..30 {
            graph.update(&mut params, &[tone]);
            params.advance(Duration::from_millis(16));
            sleep(Duration::from_millis(16));
        }
    }

    println!("Done, {} frames played.", output.frames_played());
}
