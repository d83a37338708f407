mod common;

use common::graph;
use pinflow::nodes::{Constant, Sum};
use pinflow::{
    type_hash, Graph, GraphError, GraphSnapshot, NodeId, NodeRegistry, PinFlags, PinSnapshot, PinSpec,
    UpdateParams, ValueKind,
};

struct Fixture {
    graph: Graph,
    constant: NodeId,
    sum: NodeId,
}

/// Constant feeding the first term of a four-term sum that also carries a
/// dynamic input.
fn fixture() -> Fixture {
    let mut g = graph();
    let constant = g.add_node(Constant::new(3.5));
    let sum = g.add_node(Sum::new(2));
    g.set_node_name(sum, "mixer").unwrap();

    let terms = g.inputs(sum)[0];
    g.resize_vector_pin(terms, 4).unwrap();
    let first = g.pin_children(terms)[0];
    g.connect(g.outputs(constant)[0], first).unwrap();
    g.write_input(terms, 3, 0, 7.0f32);

    let extra = g.add_input_pin(sum, PinSpec::new("extra", ValueKind::Float32)).unwrap();
    g.write_input(extra, 0, 0, 1.25f32);

    g.update(&mut UpdateParams::new(), &[sum]);
    Fixture { graph: g, constant, sum }
}

#[test]
fn snapshot_survives_json() {
    let Fixture { graph, .. } = fixture();
    let snapshot = graph.snapshot();

    let text = serde_json::to_string(&snapshot).unwrap();
    let parsed: GraphSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, snapshot);
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.nodes[0].type_hash, type_hash("constant"));
}

#[test]
fn restore_keeps_ids_links_and_values() {
    let Fixture { graph: original, constant, sum } = fixture();
    let snapshot = original.snapshot();

    let mut restored = graph();
    restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();

    assert_eq!(restored.node_ids(), original.node_ids());
    assert_eq!(restored.links(), original.links());
    assert_eq!(restored.node_info(sum).unwrap().name, "mixer");
    assert_eq!(restored.inputs(sum), original.inputs(sum));
    assert_eq!(restored.outputs(constant), original.outputs(constant));

    let terms = restored.inputs(sum)[0];
    assert_eq!(restored.pin_children(terms), original.pin_children(terms));
    assert_eq!(restored.pin_children(terms).len(), 4);
    assert_eq!(restored.read_input::<f32>(terms, 0, 0), Some(3.5));
    assert_eq!(restored.read_input::<f32>(terms, 3, 0), Some(7.0));

    let value = restored.inputs(constant)[0];
    assert_eq!(restored.read_input::<f32>(value, 0, 0), Some(3.5));

    let extra = restored.find_pin(sum, "extra").unwrap();
    assert_eq!(Some(extra), original.find_pin(sum, "extra"));
    assert!(restored.pin_info(extra).unwrap().flags().contains(PinFlags::DYNAMIC));
    assert_eq!(restored.read_input::<f32>(extra, 0, 0), Some(1.25));

    assert_eq!(restored.update_order(sum), 1);
    restored.check_invariants();
}

#[test]
fn ids_continue_after_restored_maximum() {
    let Fixture { graph: original, .. } = fixture();
    let snapshot = original.snapshot();

    let mut restored = graph();
    restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();

    let fresh = restored.add_node(Constant::new(0.0));
    assert!(fresh.raw() > snapshot.max_id());
    for pin in restored.outputs(fresh) {
        assert!(pin.raw() > snapshot.max_id());
    }
}

#[test]
fn restored_graph_runs() {
    let Fixture { graph: original, constant, sum } = fixture();
    let snapshot = original.snapshot();

    let mut restored = graph();
    restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();
    restored.update(&mut UpdateParams::new(), &[sum]);

    assert!(!restored.is_dirty(constant));
    assert!(!restored.is_dirty(sum));
    let terms = restored.inputs(sum)[0];
    assert_eq!(restored.read_input::<f32>(terms, 0, 0), Some(3.5));
}

#[test]
fn unknown_type_leaves_graph_untouched() {
    let Fixture { graph: original, .. } = fixture();
    let snapshot = original.snapshot();

    let mut target = graph();
    let existing = target.add_node(Constant::new(1.0));
    let err = target.restore(&snapshot, &NodeRegistry::new()).unwrap_err();

    assert!(matches!(err, GraphError::UnknownNodeType(_)));
    assert_eq!(target.node_ids(), vec![existing]);
}

#[test]
fn invalid_links_are_skipped() {
    let Fixture { graph: original, constant, sum } = fixture();
    let mut snapshot = original.snapshot();
    // closes a loop through the constant
    snapshot
        .links
        .push((original.outputs(sum)[0], original.inputs(constant)[0]));

    let mut restored = graph();
    restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();

    assert_eq!(restored.links(), original.links());
    restored.check_invariants();
}

#[test]
fn duplicate_ids_are_rejected() {
    let Fixture { graph: original, .. } = fixture();
    let mut snapshot = original.snapshot();
    let copy = snapshot.nodes[0].clone();
    snapshot.nodes.push(copy);

    let mut restored = graph();
    let err = restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap_err();
    assert!(matches!(err, GraphError::Snapshot(_)));
}

/// Restoring `snapshot` fails with a snapshot error and leaves the target
/// graph as it was.
fn assert_rejected(snapshot: &GraphSnapshot) {
    let mut target = graph();
    let existing = target.add_node(Constant::new(1.0));
    let err = target
        .restore(snapshot, &NodeRegistry::with_builtin())
        .unwrap_err();
    assert!(matches!(err, GraphError::Snapshot(_)), "{:?}", err);
    assert_eq!(target.node_ids(), vec![existing]);
    target.check_invariants();
}

fn extra_pin(snapshot: &mut GraphSnapshot) -> &mut PinSnapshot {
    snapshot
        .nodes
        .iter_mut()
        .flat_map(|n| n.inputs.iter_mut())
        .find(|p| p.name == "extra")
        .unwrap()
}

#[test]
fn element_wider_than_its_stride_is_rejected() {
    let Fixture { graph: original, .. } = fixture();
    let mut snapshot = original.snapshot();
    let extra = extra_pin(&mut snapshot);
    extra.num_coords = 4;
    extra.stride = Some((4, 0));
    assert_rejected(&snapshot);
}

#[test]
fn wildcard_output_is_rejected() {
    let Fixture { graph: original, .. } = fixture();
    let mut snapshot = original.snapshot();
    snapshot.nodes[0].outputs[0].kind = ValueKind::Any;
    assert_rejected(&snapshot);
}

#[test]
fn vector_of_unsized_kind_is_rejected() {
    let Fixture { graph: original, .. } = fixture();
    let mut snapshot = original.snapshot();
    let extra = extra_pin(&mut snapshot);
    extra.kind = ValueKind::Struct;
    extra.flags |= PinFlags::VECTOR.bits();
    assert_rejected(&snapshot);
}

#[test]
fn id_at_the_end_of_the_range_is_rejected() {
    let Fixture { graph: original, .. } = fixture();
    let mut value = serde_json::to_value(original.snapshot()).unwrap();
    value["nodes"][0]["id"] = serde_json::json!(u64::MAX);
    let snapshot: GraphSnapshot = serde_json::from_value(value).unwrap();
    assert_eq!(snapshot.max_id(), u64::MAX);
    assert_rejected(&snapshot);
}

#[test]
fn literal_is_saved_before_the_first_frame() {
    let mut original = graph();
    let constant = original.add_node(Constant::new(3.5));
    let snapshot = original.snapshot();

    let mut restored = graph();
    restored.restore(&snapshot, &NodeRegistry::with_builtin()).unwrap();
    let value = restored.inputs(constant)[0];
    assert_eq!(restored.read_input::<f32>(value, 0, 0), Some(3.5));

    restored.update(&mut UpdateParams::new(), &[constant]);
    assert_eq!(restored.read_input::<f32>(value, 0, 0), Some(3.5));
}
