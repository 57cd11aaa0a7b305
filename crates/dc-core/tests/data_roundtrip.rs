//! Integration tests: state → data → state round-trips (dc-core).
//!
//! Every node kind must survive `state_to_data(data_to_state(d)) == d`,
//! through both the JSON and MessagePack codecs, with ephemeral flags
//! dropped and persistent fields preserved exactly.

use dc_core::id::NodeId;
use dc_core::model::*;
use dc_core::persist::{CanvasData, data_to_state, state_to_data};
use dc_core::registry::create;
use pretty_assertions::assert_eq;

fn every_kind() -> Vec<Diagram> {
    DiagramKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| create(*kind, i as f64 * 40.0, -(i as f64) * 15.0).unwrap())
        .collect()
}

fn with_ephemeral_noise(mut d: Diagram) -> Diagram {
    d.ui.is_selected = true;
    d.ui.show_outline = true;
    d.ui.is_dragging = true;
    d.ui.show_connect_points = true;
    if let Some(exec) = d.executable.as_mut() {
        exec.is_executing = true;
    }
    d
}

// ─── Pure functions ─────────────────────────────────────────────────────

#[test]
fn state_data_roundtrip_for_every_kind() {
    for node in every_kind() {
        let data = state_to_data(&node);
        assert_eq!(state_to_data(&data_to_state(&data)), data, "{:?}", node.kind);
    }
}

#[test]
fn ephemeral_fields_are_dropped() {
    for node in every_kind() {
        let noisy = with_ephemeral_noise(node.clone());
        assert_eq!(state_to_data(&noisy), state_to_data(&node));
    }
}

#[test]
fn nested_group_roundtrip() {
    let mut group = create(DiagramKind::Group, 0.0, 0.0).unwrap();
    let mut inner = create(DiagramKind::Group, 10.0, 10.0).unwrap();
    inner.items = Some(vec![with_ephemeral_noise(
        create(DiagramKind::Ellipse, 10.0, 10.0).unwrap(),
    )]);
    group.items = Some(vec![
        create(DiagramKind::Rectangle, -50.0, 0.0).unwrap(),
        inner,
    ]);

    let data = state_to_data(&group);
    let state = data_to_state(&data);
    assert_eq!(state_to_data(&state), data);
    assert!(!state.children()[1].children()[0].is_selected());
}

// ─── Codecs ─────────────────────────────────────────────────────────────

#[test]
fn json_document_roundtrip() {
    let items: Vec<Diagram> = every_kind().into_iter().map(with_ephemeral_noise).collect();
    let doc = CanvasData::new("doc-1", -120.0, 35.5, &items);

    let json = doc.to_json().unwrap();
    let back = CanvasData::from_json(&json).unwrap();
    assert_eq!(back, doc);
    assert_eq!(back.items.len(), DiagramKind::ALL.len());
}

#[test]
fn msgpack_document_roundtrip() {
    let doc = CanvasData::new("doc-2", 0.0, 0.0, &every_kind());
    let bytes = doc.to_msgpack().unwrap();
    assert_eq!(CanvasData::from_msgpack(&bytes).unwrap(), doc);
}

#[test]
fn connect_line_fields_persist() {
    let mut line = create(DiagramKind::ConnectLine, 0.0, 0.0).unwrap();
    let a = NodeId::intern("owner-a");
    let b = NodeId::intern("owner-b");
    if let Some(ends) = line.line.as_mut() {
        ends.start_owner_id = a;
        ends.end_owner_id = b;
        ends.auto_routing = false;
        ends.start_arrow_head = ArrowHead::Circle;
    }
    line.items = Some(vec![
        Diagram::path_point(NodeId::intern("cp-a"), 0.0, 0.0),
        Diagram::path_point(NodeId::intern("mid"), 50.0, 0.0),
        Diagram::path_point(NodeId::intern("cp-b"), 50.0, 80.0),
    ]);

    let json = serde_json::to_string(&line).unwrap();
    assert!(json.contains("\"startOwnerId\":\"owner-a\""));
    assert!(json.contains("\"autoRouting\":false"));
    let back: Diagram = serde_json::from_str(&json).unwrap();
    assert_eq!(back, line);
}
