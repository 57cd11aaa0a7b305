//! Integration tests: undo/redo history driven through the canvas engine.
//!
//! Every committed gesture is one history entry; undo/redo restore the
//! whole canvas and notify observers.

use dc_core::geometry::{Point, Shape, Viewport};
use dc_core::id::NodeId;
use dc_core::model::*;
use dc_core::persist::CanvasData;
use dc_core::registry::{create, with_updated_connect_points};
use dc_editor::{
    CanvasEngine, CanvasObserver, DragEvent, EngineConfig, EventPhase, SelectEvent, TransformEvent,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rect(x: f64, y: f64, w: f64, h: f64) -> Diagram {
    let mut d = create(DiagramKind::Rectangle, x, y).unwrap();
    d.set_shape(&Shape::new(x, y, w, h));
    with_updated_connect_points(&d)
}

fn make_engine(config: EngineConfig) -> (CanvasEngine, NodeId, NodeId) {
    let (a, b) = (rect(0.0, 0.0, 40.0, 40.0), rect(200.0, 0.0, 40.0, 40.0));
    let ids = (a.id, b.id);
    let data = CanvasData::new("doc", 0.0, 0.0, &[a, b]);
    (CanvasEngine::from_data(&data, Viewport::default(), config), ids.0, ids.1)
}

fn select(engine: &mut CanvasEngine, id: NodeId, multi: bool) {
    engine.handle_select(&SelectEvent {
        id,
        is_multi_select: multi,
    });
}

struct Counter(Rc<RefCell<usize>>);

impl CanvasObserver for Counter {
    fn on_data_change(&mut self, _data: &CanvasData) {
        *self.0.borrow_mut() += 1;
    }
}

// ─── Undo / redo ────────────────────────────────────────────────────────

#[test]
fn n_commits_then_n_undos_restore_the_initial_state() {
    init();
    let (mut engine, a, b) = make_engine(EngineConfig::default());
    let initial = engine.items().to_vec();

    engine.handle_drag(a, &DragEvent::new(EventPhase::Instant, Point::new(0.0, 0.0), Point::new(30.0, 10.0)));
    let start = get_by_id(engine.items(), b).unwrap().shape().unwrap();
    engine.handle_transform(
        b,
        &TransformEvent {
            phase: EventPhase::End,
            start_shape: start,
            end_shape: Shape {
                rotation: 45.0,
                ..start
            },
        },
    );
    select(&mut engine, a, false);
    select(&mut engine, b, true);
    assert!(engine.group());
    engine.add_node(DiagramKind::Ellipse, 400.0, 400.0);
    engine.delete_selected();

    let commits = engine.history().len() - 1;
    assert_eq!(commits, 7);
    for _ in 0..commits {
        assert!(engine.undo());
    }
    assert!(!engine.undo());
    assert_eq!(engine.items(), initial.as_slice());
    assert!(engine.multi_select_group().is_none());
}

#[test]
fn undo_then_commit_disables_redo() {
    let (mut engine, a, _) = make_engine(EngineConfig::default());
    let drag = |dx: f64| DragEvent::new(EventPhase::Instant, Point::new(0.0, 0.0), Point::new(dx, 0.0));

    engine.handle_drag(a, &drag(10.0));
    engine.handle_drag(a, &drag(10.0));
    assert!(engine.undo());
    assert!(engine.can_redo());

    engine.handle_drag(a, &drag(-5.0));
    assert!(!engine.can_redo());
    assert!(!engine.redo());
    assert_eq!(get_by_id(engine.items(), a).unwrap().x, 5.0);
}

#[test]
fn redo_reapplies_the_undone_entry() {
    let (mut engine, a, _) = make_engine(EngineConfig::default());
    engine.handle_drag(a, &DragEvent::new(EventPhase::Instant, Point::new(0.0, 0.0), Point::new(25.0, 0.0)));
    let after = engine.items().to_vec();

    assert!(engine.undo());
    assert_eq!(get_by_id(engine.items(), a).unwrap().x, 0.0);
    assert!(engine.redo());
    assert_eq!(engine.items(), after.as_slice());
}

#[test]
fn history_depth_bounds_undo() {
    let config = EngineConfig {
        history_depth: 3,
        ..EngineConfig::default()
    };
    let (mut engine, a, _) = make_engine(config);
    for _ in 0..5 {
        engine.handle_drag(a, &DragEvent::new(EventPhase::Instant, Point::new(0.0, 0.0), Point::new(1.0, 0.0)));
    }
    assert!(engine.undo());
    assert!(engine.undo());
    assert!(!engine.undo());
    assert_eq!(get_by_id(engine.items(), a).unwrap().x, 3.0);
}

#[test]
fn undo_restores_the_scroll_offset() {
    let (mut engine, _, _) = make_engine(EngineConfig::default());
    engine.pointer_down(Point::new(400.0, 300.0), false);
    engine.pointer_move(Point::new(795.0, 300.0));
    assert!(engine.auto_scroll_tick());
    engine.pointer_up(Point::new(795.0, 300.0));
    assert_eq!(engine.viewport().min_x, 8.0);

    assert!(engine.undo());
    assert_eq!(engine.viewport().min_x, 0.0);
}

#[test]
fn observers_hear_commits_and_undo_but_not_progress() {
    let (mut engine, a, _) = make_engine(EngineConfig::default());
    let count = Rc::new(RefCell::new(0));
    engine.subscribe(Box::new(Counter(Rc::clone(&count))));

    let origin = Point::new(0.0, 0.0);
    engine.handle_drag(a, &DragEvent::new(EventPhase::Start, origin, origin));
    engine.handle_drag(a, &DragEvent::new(EventPhase::InProgress, origin, Point::new(4.0, 4.0)));
    assert_eq!(*count.borrow(), 0);
    engine.handle_drag(a, &DragEvent::new(EventPhase::End, origin, Point::new(8.0, 8.0)));
    assert_eq!(*count.borrow(), 1);
    engine.undo();
    assert_eq!(*count.borrow(), 2);
}

#[test]
fn host_resize_is_not_an_edit_but_undo_restores_it() {
    init();
    let (mut engine, a, _) = make_engine(EngineConfig::default());
    engine.set_viewport(Viewport {
        width: 1024.0,
        ..*engine.viewport()
    });
    let entries = engine.history().len();

    engine.pointer_down(Point::new(400.0, 500.0), false);
    engine.pointer_up(Point::new(400.0, 500.0));
    assert_eq!(engine.history().len(), entries);

    select(&mut engine, a, false);
    assert_eq!(engine.history().len(), entries + 1);
    assert!(engine.undo());
    assert_eq!(engine.viewport().width, 800.0);
}
