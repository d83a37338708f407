mod common;

use common::{graph, Recorder};
use dasp_graph::Buffer;
use pinflow::nodes::{EventInput, Tone};
use pinflow::{Event, Graph, GraphConfig, IdAllocator, NodeRegistry, PinSpec, UpdateParams};

fn audio_graph(config: GraphConfig) -> Graph {
    Graph::with_allocator(config, IdAllocator::new())
}

fn loudest(block: &[Buffer]) -> f32 {
    block
        .iter()
        .flat_map(|b| b.iter())
        .fold(0.0f32, |max, s| max.max(s.abs()))
}

#[test]
fn tone_reaches_the_renderer_and_leaves_again() {
    let mut g = graph();
    let tone = g.add_node(Tone::new(440.0, 0.5));
    let mut renderer = g.take_audio_renderer().unwrap();
    assert!(g.take_audio_renderer().is_none());

    let mut block = vec![Buffer::SILENT; 2];
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 1);
    assert!(loudest(&block) > 0.0);
    assert_eq!(block[0][..], block[1][..]);

    g.remove_node(tone).unwrap();
    renderer.render(&mut block);
    assert!(renderer.is_empty());
    assert_eq!(loudest(&block), 0.0);

    // retired processor comes back and is dropped here
    g.update(&mut UpdateParams::new(), &[]);
    assert_eq!(g.pending_audio_commands(), 0);
}

#[test]
fn full_command_ring_defers_to_next_frame() {
    let mut g = audio_graph(GraphConfig::default().with_audio_command_capacity(1));
    let mut renderer = g.take_audio_renderer().unwrap();

    g.add_node(Tone::default());
    g.add_node(Tone::default());
    assert_eq!(g.pending_audio_commands(), 1);

    let mut block = vec![Buffer::SILENT; 2];
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 1);

    g.update(&mut UpdateParams::new(), &[]);
    assert_eq!(g.pending_audio_commands(), 0);
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 2);
}

#[test]
fn processor_limit_holds_inserts_until_a_slot_frees() {
    let mut g = audio_graph(GraphConfig::default().with_max_audio_nodes(1));
    let mut renderer = g.take_audio_renderer().unwrap();

    let first = g.add_node(Tone::default());
    g.add_node(Tone::default());
    assert_eq!(g.pending_audio_commands(), 1);

    let mut block = vec![Buffer::SILENT; 2];
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 1);

    g.remove_node(first).unwrap();
    assert_eq!(g.pending_audio_commands(), 0);
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 1);
}

#[test]
fn removing_before_the_insert_is_sent_drops_it() {
    let mut g = audio_graph(GraphConfig::default().with_max_audio_nodes(1));
    let mut renderer = g.take_audio_renderer().unwrap();

    g.add_node(Tone::default());
    let second = g.add_node(Tone::default());
    assert_eq!(g.pending_audio_commands(), 1);

    g.remove_node(second).unwrap();
    assert_eq!(g.pending_audio_commands(), 0);

    let mut block = vec![Buffer::SILENT; 2];
    renderer.render(&mut block);
    assert_eq!(renderer.len(), 1);
}

#[test]
fn interleaved_output_repeats_the_last_channel() {
    let mut g = audio_graph(GraphConfig::default().with_channels(1));
    g.add_node(Tone::new(1000.0, 0.5));
    let mut renderer = g.take_audio_renderer().unwrap();
    assert_eq!(renderer.channels(), 1);

    // two and a half blocks of stereo frames
    let mut data = vec![0.0f32; Buffer::LEN * 5];
    renderer.render_interleaved(&mut data, 2);

    assert!(data.iter().any(|s| *s != 0.0));
    for frame in data.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn worker_events_reach_connected_queues() {
    let mut g = graph();
    let (source, mut sender) = EventInput::attach(&mut g, 8);
    let sink = g.add_node(Recorder::new("sink").input(PinSpec::events("notes").capacity(8)));
    let queue = g.inputs(sink)[0];
    g.connect(g.outputs(source)[0], queue).unwrap();

    let mut params = UpdateParams::new();
    g.update(&mut params, &[]);
    assert!(!g.is_dirty(source));

    let events = [Event::note_on(0, 60, 100), Event::note_off(0, 60)];
    for event in events {
        sender.send(event).unwrap();
    }
    assert!(g.is_dirty(source));

    g.update(&mut params, &[]);
    assert_eq!(g.queued_events(queue), events.to_vec());
    assert!(g.is_dirty(sink));
    assert_eq!(params.scratch.leased(), 0);
}

#[test]
fn overflowing_queue_keeps_nothing_from_the_batch() {
    let mut g = graph();
    let (source, mut sender) = EventInput::attach(&mut g, 8);
    let small = g.add_node(Recorder::new("small").input(PinSpec::events("notes").capacity(2)));
    let large = g.add_node(Recorder::new("large").input(PinSpec::events("notes").capacity(8)));
    let out = g.outputs(source)[0];
    g.connect(out, g.inputs(small)[0]).unwrap();
    g.connect(out, g.inputs(large)[0]).unwrap();

    for note in 60..63 {
        sender.send(Event::note_on(0, note, 90)).unwrap();
    }
    g.update(&mut UpdateParams::new(), &[]);

    assert!(g.queued_events(g.inputs(small)[0]).is_empty());
    let received = g.queued_events(g.inputs(large)[0]);
    assert_eq!(received.len(), 3);
    assert_eq!(received[2].as_note().map(|n| n.note), Some(62));
}

#[test]
fn sender_hands_back_events_when_full() {
    let mut g = graph();
    let (_, mut sender) = EventInput::attach(&mut g, 1);
    assert_eq!(sender.slots(), 1);

    sender.send(Event::note_on(0, 60, 100)).unwrap();
    let rejected = Event::note_on(0, 61, 100);
    assert_eq!(sender.send(rejected), Err(rejected));
}

#[test]
fn restored_event_input_hands_out_its_sender_once() {
    let mut original = graph();
    let source = original.add_node(EventInput::default());
    let snapshot = original.snapshot();

    let mut g = graph();
    g.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();
    let mut sender = EventInput::sender(&mut g, source).unwrap();
    assert_eq!(sender.node(), source);
    assert!(EventInput::sender(&mut g, source).is_none());

    let sink = g.add_node(Recorder::new("sink").input(PinSpec::events("notes").capacity(8)));
    assert!(EventInput::sender(&mut g, sink).is_none());
    let queue = g.inputs(sink)[0];
    g.connect(g.outputs(source)[0], queue).unwrap();

    let mut params = UpdateParams::new();
    g.update(&mut params, &[]);
    let note = Event::note_on(1, 64, 80);
    sender.send(note).unwrap();
    assert!(g.is_dirty(source));

    g.update(&mut params, &[]);
    assert_eq!(g.queued_events(queue), vec![note]);
}

#[test]
fn attached_input_has_no_second_sender() {
    let mut g = graph();
    let (source, _sender) = EventInput::attach(&mut g, 4);
    assert!(EventInput::sender(&mut g, source).is_none());
}
