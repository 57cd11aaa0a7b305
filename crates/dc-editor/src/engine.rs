//! Canvas engine: the interaction state machine.
//!
//! `CanvasEngine` owns the canvas-wide state (viewport, diagram tree,
//! synthetic multi-select group), the undo/redo history and the single
//! active gesture. Hosts drive it two ways:
//!
//! - **Typed events** (`handle_drag`, `handle_transform`, `handle_select`,
//!   `handle_connect`, `execute`) carry their own phase and geometry.
//! - **Pointer calls** (`pointer_down`, `start_transform`, `start_connect`,
//!   `start_vertex_drag`, `start_midpoint_drag`, `pointer_move`,
//!   `pointer_up`) take client coordinates; the engine hit-tests, picks the
//!   gesture and derives every end shape itself.
//!
//! Only gesture ends and one-shot edits reach the history. Every commit is
//! reported to the subscribed observers.

use crate::config::EngineConfig;
use crate::connect;
use crate::history::{History, Snapshot};
use crate::hit::hit_test;
use crate::input::{
    ConnectError, ConnectEvent, DragEvent, EventPhase, ExecuteEvent, SelectEvent, TransformEvent,
};
use crate::scroll::{EdgeScroll, ScrollChange};
use crate::selection::{self, AreaSelection};
use crate::transform::{self, TransformBaseline, TransformHandle};
use dc_core::geometry::{Point, Shape, Viewport};
use dc_core::id::NodeId;
use dc_core::model::{
    Diagram, DiagramIndex, DiagramKind, ancestors_of, collect_ids, find_parent, get_by_id,
    map_recursive, remove_by_ids, replace_by_ids,
};
use dc_core::persist::CanvasData;
use dc_core::registry;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// ─── Collaborators ───────────────────────────────────────────────────────

/// Outbound notifications. Implemented by persistence and execution hosts.
pub trait CanvasObserver {
    /// A change was committed (or undone/redone).
    fn on_data_change(&mut self, data: &CanvasData);

    /// A node asked to execute.
    fn on_execute(&mut self, _notice: &ExecutionNotice) {}
}

/// An execution request forwarded to observers, with the end owners of
/// the connectors leaving the executing node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionNotice {
    pub id: NodeId,
    pub data: Value,
    pub downstream: Vec<NodeId>,
}

// ─── State ───────────────────────────────────────────────────────────────

/// Canvas-wide state read by the host for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasState {
    pub id: String,
    pub viewport: Viewport,
    pub items: Vec<Diagram>,
    /// Present while two or more nodes are selected. Never persisted.
    pub multi_select_group: Option<Diagram>,
}

/// Which gesture owns the canvas. Exactly one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionMode {
    Idle,
    /// Moving a node, the multi-select group, or a connector vertex.
    Dragging(NodeId),
    /// `handle` is `None` when the host supplies end shapes directly.
    Transforming {
        id: NodeId,
        handle: Option<TransformHandle>,
    },
    AreaSelecting(AreaSelection),
    Connecting {
        point_id: NodeId,
        preview: Vec<Point>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Edit {
    Translate,
    Reshape(TransformHandle),
    /// End shapes arrive through `handle_transform`.
    Explicit,
    Vertex(usize),
    NewVertex,
}

impl Edit {
    fn is_drag(self) -> bool {
        matches!(self, Edit::Translate | Edit::Vertex(_) | Edit::NewVertex)
    }
}

#[derive(Debug, Clone)]
struct Gesture {
    baseline: TransformBaseline,
    /// Canvas position of the initiating pointer-down.
    origin: Point,
    edit: Edit,
    moved: bool,
}

// ─── Engine ──────────────────────────────────────────────────────────────

pub struct CanvasEngine {
    state: CanvasState,
    history: History,
    mode: InteractionMode,
    gesture: Option<Gesture>,
    scroll: EdgeScroll,
    /// Last pointer position (client space) of the active gesture.
    last_client: Option<Point>,
    config: EngineConfig,
    observers: Vec<Box<dyn CanvasObserver>>,
}

impl CanvasEngine {
    /// An empty canvas.
    pub fn new(id: impl Into<String>, viewport: Viewport, config: EngineConfig) -> Self {
        Self::with_items(id.into(), viewport, Vec::new(), config)
    }

    /// A canvas loaded from a persisted document. The document's scroll
    /// offset wins over the one in `viewport`.
    pub fn from_data(data: &CanvasData, viewport: Viewport, config: EngineConfig) -> Self {
        let viewport = Viewport {
            min_x: data.min_x,
            min_y: data.min_y,
            ..viewport
        };
        Self::with_items(data.id.clone(), viewport, data.to_state(), config)
    }

    fn with_items(id: String, viewport: Viewport, items: Vec<Diagram>, config: EngineConfig) -> Self {
        let state = CanvasState {
            id,
            viewport,
            items,
            multi_select_group: None,
        };
        let history = History::new(snapshot_of(&state), config.history_depth);
        let scroll = EdgeScroll::new(config.edge_scroll_threshold, config.edge_scroll_step);
        Self {
            state,
            history,
            mode: InteractionMode::Idle,
            gesture: None,
            scroll,
            last_client: None,
            config,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn CanvasObserver>) {
        self.observers.push(observer);
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn items(&self) -> &[Diagram] {
        &self.state.items
    }

    pub fn viewport(&self) -> &Viewport {
        &self.state.viewport
    }

    /// Pan/zoom/resize from the host. Not an undoable change.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    pub fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    pub fn multi_select_group(&self) -> Option<&Diagram> {
        self.state.multi_select_group.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// The persistable document for the current state.
    pub fn to_data(&self) -> CanvasData {
        let v = &self.state.viewport;
        CanvasData::new(self.state.id.clone(), v.min_x, v.min_y, &self.state.items)
    }

    // ─── Commit ──────────────────────────────────────────────────────────

    fn snapshot(&self) -> Snapshot {
        snapshot_of(&self.state)
    }

    fn commit(&mut self) {
        self.history = self.history.commit(self.snapshot());
        self.notify();
    }

    /// Commit unless the document matches the current history entry.
    /// A host resize alone is not an edit.
    fn commit_if_changed(&mut self) {
        if !self.history.current().same_document(&self.snapshot()) {
            self.commit();
        }
    }

    fn notify(&mut self) {
        let data = self.to_data();
        for observer in &mut self.observers {
            observer.on_data_change(&data);
        }
    }

    fn sync_multi_group(&mut self) {
        self.state.multi_select_group = selection::build_multi_select_group(&self.state.items);
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    /// Create a node of `kind` centered at (x, y) at the top of the canvas.
    /// Vertices and connectors are made by their own gestures.
    pub fn add_node(&mut self, kind: DiagramKind, x: f64, y: f64) -> Option<NodeId> {
        if matches!(kind, DiagramKind::PathPoint | DiagramKind::ConnectLine) {
            log::warn!("{kind:?} cannot be added on its own");
            return None;
        }
        let node = registry::create(kind, x, y)?;
        let id = node.id;
        self.state.items.push(node);
        log::debug!("added {kind:?} {id}");
        self.commit();
        Some(id)
    }

    /// Replace a node's persistent fields (text, style, geometry) by id.
    /// Attached connectors and enclosing groups follow the new geometry.
    pub fn update_node(&mut self, node: Diagram) -> bool {
        let Some(current) = get_by_id(&self.state.items, node.id) else {
            log::warn!("update of unknown node {}", node.id);
            return false;
        };
        if current.kind != node.kind {
            log::warn!("update of {} cannot change {:?} to {:?}", node.id, current.kind, node.kind);
            return false;
        }
        let mut next = registry::with_updated_connect_points(&node);
        next.ui = current.ui;
        let id = next.id;

        let before = self.state.items.clone();
        let tree = replace_by_ids(&before, &HashMap::from([(id, next)]));
        let (tree, rerouted) = connect::refresh_connect_lines(&tree, &before, &HashSet::from([id]), &self.config);
        let mut dirty = vec![id];
        dirty.extend(rerouted);
        self.state.items = selection::refresh_outline_flags(&transform::refit_ancestors(&tree, &dirty));
        self.sync_multi_group();
        self.commit();
        true
    }

    /// Delete the selection with its subtrees, plus every connector left
    /// without an owner.
    pub fn delete_selected(&mut self) {
        let items = &self.state.items;
        let selected = selection::selected_ids(items);
        if selected.is_empty() {
            return;
        }
        let removed: HashSet<NodeId> = selected
            .iter()
            .filter_map(|id| get_by_id(items, *id))
            .flat_map(|d| collect_ids(std::slice::from_ref(d)))
            .collect();
        let mut doomed: HashSet<NodeId> = selected.iter().copied().collect();
        doomed.extend(connect::lines_attached_to(items, &removed));
        let parents: HashSet<NodeId> = doomed
            .iter()
            .filter_map(|id| find_parent(items, *id).map(|p| p.id))
            .collect();
        log::debug!("deleting {} nodes", doomed.len());

        let tree = remove_by_ids(items, &doomed);
        let tree = selection::drop_empty_groups(&tree, &parents);
        let containers: HashSet<NodeId> = parents
            .into_iter()
            .filter(|id| get_by_id(&tree, *id).is_some())
            .collect();
        self.state.items = selection::refresh_outline_flags(&transform::refit_containers(&tree, &containers));
        self.state.multi_select_group = None;
        self.commit();
    }

    // ─── Selection ───────────────────────────────────────────────────────

    pub fn handle_select(&mut self, event: &SelectEvent) {
        if self.apply_select(event.id, event.is_multi_select) {
            self.commit();
        }
    }

    /// Returns whether the selection changed.
    fn apply_select(&mut self, id: NodeId, multi: bool) -> bool {
        let was_selected = get_by_id(&self.state.items, id).is_some_and(Diagram::is_selected);
        let next = selection::select(&self.state.items, id, multi);
        if next == self.state.items {
            return false;
        }
        self.state.items = next;
        if multi && was_selected {
            // Re-synthesized by the next gesture over the selection.
            self.state.multi_select_group = None;
        } else {
            self.sync_multi_group();
        }
        true
    }

    /// Escape.
    pub fn clear_selection(&mut self) {
        let next = selection::clear_selection(&self.state.items);
        if next != self.state.items {
            self.state.items = next;
            self.state.multi_select_group = None;
            self.commit();
        }
    }

    pub fn select_all(&mut self) {
        let next = selection::select_all(&self.state.items);
        if next != self.state.items {
            self.state.items = next;
            self.sync_multi_group();
            self.commit();
        }
    }

    /// Turn the multi-selection into a persistent group. Invalid
    /// preconditions are logged and leave the canvas untouched.
    pub fn group(&mut self) -> bool {
        match selection::group_selected(&self.state.items) {
            Ok(tree) => {
                self.state.items = tree;
                self.sync_multi_group();
                self.commit();
                true
            }
            Err(err) => {
                log::error!("group failed: {err}");
                false
            }
        }
    }

    pub fn ungroup(&mut self) -> bool {
        match selection::ungroup_selected(&self.state.items) {
            Ok(tree) => {
                self.state.items = tree;
                self.sync_multi_group();
                self.commit();
                true
            }
            Err(err) => {
                log::error!("ungroup failed: {err}");
                false
            }
        }
    }

    // ─── Typed gesture events ────────────────────────────────────────────

    /// Drag `id` (or the multi-select group it belongs to) by the event's
    /// start→end offset.
    pub fn handle_drag(&mut self, id: NodeId, event: &DragEvent) {
        if (event.phase.starts() || self.gesture.is_none()) && !self.begin(id, Edit::Translate, event.start()) {
            return;
        }
        let Some(start) = self.gesture.as_ref().and_then(|g| g.baseline.start_shape()) else {
            return;
        };
        if event.phase != EventPhase::Start {
            let (dx, dy) = event.delta();
            self.apply_shape(&transform::translate_shape(&start, dx, dy));
        }
        if event.phase.commits() {
            self.finish_gesture(true);
        }
    }

    /// Move `id` (or the multi-select group) to the event's end shape.
    /// The start shape is taken from the tree when the gesture begins; a
    /// different `event.start_shape` is logged and ignored.
    pub fn handle_transform(&mut self, id: NodeId, event: &TransformEvent) {
        let origin = event.start_shape.center();
        if (event.phase.starts() || self.gesture.is_none()) && !self.begin(id, Edit::Explicit, origin) {
            return;
        }
        if let Some(start) = self.gesture.as_ref().and_then(|g| g.baseline.start_shape())
            && !start.approx_eq(&event.start_shape)
        {
            log::debug!("transform of {id}: event start {:?} differs from tree {start:?}", event.start_shape);
        }
        if event.phase != EventPhase::Start {
            self.apply_shape(&event.end_shape);
        }
        if event.phase.commits() {
            self.finish_gesture(true);
        }
    }

    /// Create a connector from a host-built vertex list. The payload is
    /// checked before anything changes.
    pub fn handle_connect(&mut self, payload: &Value) -> Result<NodeId, ConnectError> {
        let event = ConnectEvent::from_value(payload)
            .and_then(|e| e.validate(&self.state.items).map(|()| e))
            .inspect_err(|err| log::warn!("rejected connect payload: {err}"))?;
        let line = connect::line_from_event(&event)
            .ok_or_else(|| ConnectError::Malformed("connector kind is not registered".into()))?;
        let id = line.id;
        self.state.items.push(line);
        log::debug!("connected {} → {} with {id}", event.start_owner_id, event.end_owner_id);
        self.commit();
        Ok(id)
    }

    /// Forward an execution request with its downstream targets.
    pub fn execute(&mut self, event: &ExecuteEvent) {
        let Some(node) = get_by_id(&self.state.items, event.id) else {
            log::warn!("execute of unknown node {}", event.id);
            return;
        };
        if node.executable.is_none() {
            log::warn!("{} is not executable", event.id);
            return;
        }
        let notice = ExecutionNotice {
            id: event.id,
            data: event.data.clone(),
            downstream: connect::downstream_of(&self.state.items, event.id),
        };
        log::debug!("execute {} → {:?}", notice.id, notice.downstream);
        for observer in &mut self.observers {
            observer.on_execute(&notice);
        }
    }

    // ─── Gesture plumbing ────────────────────────────────────────────────

    /// The node a gesture on `id` moves: the multi-select group when `id`
    /// is it or one of its members, the node itself otherwise.
    fn gesture_target(&mut self, id: NodeId) -> Option<Diagram> {
        let selected = selection::selected_ids(&self.state.items);
        let multi = id == NodeId::multi_select_group() || (selected.len() >= 2 && selected.contains(&id));
        if !multi {
            return get_by_id(&self.state.items, id).cloned();
        }
        let fresh = selection::build_multi_select_group(&self.state.items)?;
        // A rotated or resized group keeps its own box; members are re-read.
        let group = match self.state.multi_select_group.take() {
            Some(mut stored) => {
                stored.items = fresh.items;
                stored
            }
            None => fresh,
        };
        self.state.multi_select_group = Some(group.clone());
        Some(group)
    }

    fn begin(&mut self, id: NodeId, edit: Edit, origin: Point) -> bool {
        let Some(target) = self.gesture_target(id) else {
            log::debug!("no gesture target {id}");
            return false;
        };
        if target.shape().is_none() {
            log::debug!("{id} has no shape to move");
            return false;
        }
        if edit == Edit::Translate && target.kind == DiagramKind::ConnectLine {
            log::debug!("connector {id} moves with its owners only");
            return false;
        }
        let members: HashSet<NodeId> = if target.id == NodeId::multi_select_group() {
            target.children().iter().map(|c| c.id).collect()
        } else {
            HashSet::from([target.id])
        };
        self.state.items = mark_gesture(&self.state.items, &members, edit.is_drag());
        let Some(target) = self.gesture_target(target.id) else {
            return false;
        };

        self.mode = if edit.is_drag() {
            InteractionMode::Dragging(target.id)
        } else {
            InteractionMode::Transforming {
                id: target.id,
                handle: match edit {
                    Edit::Reshape(handle) => Some(handle),
                    _ => None,
                },
            }
        };
        log::debug!("gesture start {:?} on {}", edit, target.id);
        self.gesture = Some(Gesture {
            baseline: TransformBaseline::capture(&self.state.items, &target),
            origin,
            edit,
            moved: false,
        });
        true
    }

    fn apply_shape(&mut self, end: &Shape) {
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };
        let (tree, moved) = transform::apply_transform(&self.state.items, &gesture.baseline, end, &self.config);
        gesture.moved = true;
        self.state.items = tree;
        if moved.id == NodeId::multi_select_group() {
            self.state.multi_select_group = Some(moved);
        }
    }

    fn write_line(&mut self, line: Diagram) {
        let id = line.id;
        let tree = replace_by_ids(&self.state.items, &HashMap::from([(id, line)]));
        self.state.items = transform::refit_ancestors(&tree, &[id]);
        if let Some(gesture) = self.gesture.as_mut() {
            gesture.moved = true;
        }
    }

    /// Close the active gesture. `always_commit` is set for typed events,
    /// whose End/Instant phases each own one history entry.
    fn finish_gesture(&mut self, always_commit: bool) {
        if let Some(gesture) = self.gesture.take() {
            log::debug!("gesture end {:?} on {}", gesture.edit, gesture.baseline.target.id);
            if gesture.edit == Edit::NewVertex {
                let line_id = gesture.baseline.target.id;
                if gesture.moved {
                    if let Some(line) = get_by_id(&self.state.items, line_id) {
                        let line = connect::finalize_new_vertex(line);
                        self.write_line(line);
                    }
                } else {
                    self.state.items = gesture.baseline.canvas;
                }
            }
        }
        self.mode = InteractionMode::Idle;
        self.scroll.stop();
        self.last_client = None;
        self.state.items = clear_gesture_flags(&self.state.items);
        if let Some(group) = self.state.multi_select_group.as_mut() {
            group.items = group.items.as_deref().map(clear_gesture_flags);
        }
        if always_commit {
            self.commit();
        } else {
            self.commit_if_changed();
        }
    }

    // ─── Pointer gestures ────────────────────────────────────────────────

    /// Pointer pressed on the canvas. A hit selects the node's top-level
    /// item (toggling under `multi`) and starts dragging the selection;
    /// empty canvas starts an area selection.
    pub fn pointer_down(&mut self, client: Point, multi: bool) {
        if self.mode != InteractionMode::Idle {
            log::debug!("pointer down ignored while {:?}", self.mode);
            return;
        }
        let p = self.state.viewport.client_to_canvas(client);
        let Some(hit) = hit_test(&self.state.items, p) else {
            self.start_area_select(client, multi);
            return;
        };
        let id = ancestors_of(&self.state.items, hit).last().copied().unwrap_or(hit);

        let already = get_by_id(&self.state.items, id).is_some_and(Diagram::is_selected);
        let changed = if multi || !already { self.apply_select(id, multi) } else { false };
        let selected = get_by_id(&self.state.items, id).is_some_and(Diagram::is_selected);
        if selected && self.begin(id, Edit::Translate, p) {
            self.last_client = Some(client);
        } else if changed {
            self.commit();
        }
    }

    /// Begin dragging `id` without touching the selection.
    pub fn start_drag(&mut self, id: NodeId, client: Point) -> bool {
        if self.mode != InteractionMode::Idle {
            return false;
        }
        let p = self.state.viewport.client_to_canvas(client);
        let started = self.begin(id, Edit::Translate, p);
        if started {
            self.last_client = Some(client);
        }
        started
    }

    /// Begin a handle drag on `id` (or the multi-select group id).
    pub fn start_transform(&mut self, id: NodeId, handle: TransformHandle, client: Point) -> bool {
        if self.mode != InteractionMode::Idle {
            return false;
        }
        let p = self.state.viewport.client_to_canvas(client);
        let started = self.begin(id, Edit::Reshape(handle), p);
        if started {
            self.last_client = Some(client);
        }
        started
    }

    /// Begin a marquee. Without `multi` the current selection is dropped.
    pub fn start_area_select(&mut self, client: Point, multi: bool) {
        if self.mode != InteractionMode::Idle {
            return;
        }
        if !multi {
            self.state.items = selection::clear_selection(&self.state.items);
            self.state.multi_select_group = None;
        }
        let p = self.state.viewport.client_to_canvas(client);
        log::debug!("area selection from {p:?}");
        self.mode = InteractionMode::AreaSelecting(AreaSelection::new(p, multi));
        self.last_client = Some(client);
    }

    /// Begin a connect gesture from a connect point.
    pub fn start_connect(&mut self, point_id: NodeId, client: Point) -> bool {
        if self.mode != InteractionMode::Idle {
            return false;
        }
        let index = DiagramIndex::build(&self.state.items);
        let Some((_, point)) = connect::attachment(&self.state.items, &index, point_id) else {
            log::debug!("unknown connect point {point_id}");
            return false;
        };
        log::debug!("connect from {point_id}");
        let source = index.owner_of_point(point_id);
        let start = point.position();
        self.state.items = show_connect_targets(&self.state.items, source);
        self.mode = InteractionMode::Connecting {
            point_id,
            preview: vec![start],
        };
        self.last_client = Some(client);
        true
    }

    /// Begin dragging vertex `index` of connector `line_id`.
    pub fn start_vertex_drag(&mut self, line_id: NodeId, index: usize, client: Point) -> bool {
        self.begin_vertex_edit(line_id, client, |line| Some((line.clone(), Edit::Vertex(index))))
    }

    /// Begin dragging the midpoint handle of segment `segment` of
    /// `line_id`, inserting a vertex there.
    pub fn start_midpoint_drag(&mut self, line_id: NodeId, segment: usize, client: Point) -> bool {
        self.begin_vertex_edit(line_id, client, |line| {
            connect::insert_vertex(line, segment).map(|inserted| (inserted, Edit::NewVertex))
        })
    }

    fn begin_vertex_edit<F>(&mut self, line_id: NodeId, client: Point, prepare: F) -> bool
    where
        F: FnOnce(&Diagram) -> Option<(Diagram, Edit)>,
    {
        if self.mode != InteractionMode::Idle {
            return false;
        }
        let Some(line) = get_by_id(&self.state.items, line_id).filter(|d| d.kind == DiagramKind::ConnectLine) else {
            log::debug!("{line_id} is not a connector");
            return false;
        };
        let Some((mut target, edit)) = prepare(line) else {
            return false;
        };
        target.ui.is_dragging = true;
        let canvas = self.state.items.clone();
        let tree = replace_by_ids(&canvas, &HashMap::from([(line_id, target.clone())]));
        self.state.items = transform::refit_ancestors(&tree, &[line_id]);
        self.mode = InteractionMode::Dragging(line_id);
        self.gesture = Some(Gesture {
            baseline: TransformBaseline { target, canvas },
            origin: self.state.viewport.client_to_canvas(client),
            edit,
            moved: false,
        });
        self.last_client = Some(client);
        true
    }

    /// Pointer moved. Returns whether edge auto-scroll should start or stop;
    /// the host runs the timer that calls `auto_scroll_tick`.
    pub fn pointer_move(&mut self, client: Point) -> ScrollChange {
        if self.mode == InteractionMode::Idle {
            return ScrollChange::Unchanged;
        }
        self.last_client = Some(client);
        let change = self.scroll.update(client, &self.state.viewport);
        self.track(client);
        change
    }

    /// Pointer released: finalize whatever gesture is active.
    pub fn pointer_up(&mut self, client: Point) {
        if self.mode == InteractionMode::Idle {
            return;
        }
        self.track(client);
        match self.mode.clone() {
            InteractionMode::Idle => {}
            InteractionMode::Dragging(_) | InteractionMode::Transforming { .. } => self.finish_gesture(false),
            InteractionMode::AreaSelecting(area) => {
                self.state.items = selection::finish_area_selection(&self.state.items, &area);
                self.sync_multi_group();
                self.end_pointer();
                self.commit_if_changed();
            }
            InteractionMode::Connecting { point_id, .. } => {
                let p = self.state.viewport.client_to_canvas(client);
                self.end_pointer();
                self.state.items = show_connect_targets(&self.state.items, None);
                self.finish_connect(point_id, p);
            }
        }
    }

    fn end_pointer(&mut self) {
        self.mode = InteractionMode::Idle;
        self.scroll.stop();
        self.last_client = None;
    }

    /// One auto-scroll timer tick: shift the viewport and replay the last
    /// pointer position so the gesture follows the scrolled canvas.
    /// Returns `false` when the host should stop its timer.
    pub fn auto_scroll_tick(&mut self) -> bool {
        if self.mode == InteractionMode::Idle {
            self.scroll.stop();
            return false;
        }
        let (Some(client), Some((dx, dy))) = (self.last_client, self.scroll.delta(self.state.viewport.zoom)) else {
            return false;
        };
        self.state.viewport.min_x += dx;
        self.state.viewport.min_y += dy;
        log::trace!("auto scroll by ({dx}, {dy})");
        self.track(client);
        true
    }

    /// Recompute the active gesture for a pointer at `client`.
    fn track(&mut self, client: Point) {
        let p = self.state.viewport.client_to_canvas(client);
        match self.mode.clone() {
            InteractionMode::Idle => {}
            InteractionMode::Dragging(_) | InteractionMode::Transforming { .. } => self.track_gesture(p),
            InteractionMode::AreaSelecting(mut area) => {
                area.end = p;
                self.state.items = selection::outline_contained(&self.state.items, &area.marquee());
                self.mode = InteractionMode::AreaSelecting(area);
            }
            InteractionMode::Connecting { point_id, .. } => {
                let index = DiagramIndex::build(&self.state.items);
                if let Some((owner, point)) = connect::attachment(&self.state.items, &index, point_id) {
                    let preview = connect::preview_path(owner, point, p, self.config.connect_margin);
                    self.mode = InteractionMode::Connecting { point_id, preview };
                }
            }
        }
    }

    fn track_gesture(&mut self, p: Point) {
        let Some(gesture) = self.gesture.as_ref() else {
            return;
        };
        // A press without movement changes nothing.
        if !gesture.moved && p.approx_eq(gesture.origin) {
            return;
        }
        let (edit, origin) = (gesture.edit, gesture.origin);
        let baseline = &gesture.baseline;
        match edit {
            Edit::Translate => {
                if let Some(start) = baseline.start_shape() {
                    let end = transform::translate_shape(&start, p.x - origin.x, p.y - origin.y);
                    self.apply_shape(&end);
                }
            }
            Edit::Reshape(handle) => {
                if let Some(start) = baseline.start_shape() {
                    let keep = baseline.target.transform.is_some_and(|t| t.keep_proportion);
                    let end = transform::resize_by_handle(&start, handle, p, keep, self.config.min_shape_size);
                    self.apply_shape(&end);
                }
            }
            Edit::Explicit => {}
            Edit::Vertex(index) => {
                let line = connect::move_vertex(&baseline.target, index, p);
                self.write_line(line);
            }
            Edit::NewVertex => {
                let line = connect::move_new_vertex(&baseline.target, p);
                self.write_line(line);
            }
        }
    }

    /// Drop of a connect gesture at canvas point `p`: attach to the nearest
    /// connect point of the node under the cursor, if it is another owner.
    fn finish_connect(&mut self, point_id: NodeId, p: Point) {
        let items = &self.state.items;
        let index = DiagramIndex::build(items);
        let source_owner = index.owner_of_point(point_id);
        let target = hit_test(items, p)
            .and_then(|id| get_by_id(items, id))
            .filter(|d| !d.connect_points().is_empty() && Some(d.id) != source_owner);
        let Some(target) = target else {
            log::debug!("connect from {point_id} dropped on nothing");
            return;
        };
        let Some(end_point) = target
            .connect_points()
            .iter()
            .min_by(|a, b| a.position().distance(p).total_cmp(&b.position().distance(p)))
            .map(|cp| cp.id)
        else {
            return;
        };
        if let Some(line) = connect::create_connect_line(items, point_id, end_point, &self.config) {
            log::debug!("connected {point_id} → {end_point} with {}", line.id);
            self.state.items.push(line);
            self.commit();
        }
    }

    // ─── History ─────────────────────────────────────────────────────────

    pub fn undo(&mut self) -> bool {
        if self.mode != InteractionMode::Idle {
            log::debug!("undo ignored during a gesture");
            return false;
        }
        let Some((history, snapshot)) = self.history.undo() else {
            return false;
        };
        self.history = history;
        self.restore(&snapshot);
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.mode != InteractionMode::Idle {
            log::debug!("redo ignored during a gesture");
            return false;
        }
        let Some((history, snapshot)) = self.history.redo() else {
            return false;
        };
        self.history = history;
        self.restore(&snapshot);
        true
    }

    fn restore(&mut self, snapshot: &Snapshot) {
        let v = &mut self.state.viewport;
        v.min_x = snapshot.min_x;
        v.min_y = snapshot.min_y;
        v.width = snapshot.width;
        v.height = snapshot.height;
        self.state.items = snapshot.items.clone();
        self.sync_multi_group();
        self.notify();
    }
}

fn snapshot_of(state: &CanvasState) -> Snapshot {
    let v = &state.viewport;
    Snapshot {
        min_x: v.min_x,
        min_y: v.min_y,
        width: v.width,
        height: v.height,
        items: state.items.clone(),
    }
}

fn mark_gesture(items: &[Diagram], ids: &HashSet<NodeId>, dragging: bool) -> Vec<Diagram> {
    map_recursive(items, &mut |d| {
        let mut next = d.clone();
        if ids.contains(&d.id) {
            next.ui.is_dragging = dragging;
            next.ui.is_transforming = !dragging;
        }
        next
    })
}

/// Show connect points on every connectable node except `source`; with
/// `None` they are all hidden again.
fn show_connect_targets(items: &[Diagram], source: Option<NodeId>) -> Vec<Diagram> {
    map_recursive(items, &mut |d| {
        let mut next = d.clone();
        next.ui.show_connect_points =
            source.is_some_and(|s| s != d.id) && registry::capabilities(d.kind).connectable;
        next
    })
}

fn clear_gesture_flags(items: &[Diagram]) -> Vec<Diagram> {
    map_recursive(items, &mut |d| {
        let mut next = d.clone();
        next.ui.is_dragging = false;
        next.ui.is_transforming = false;
        next
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        changes: Rc<RefCell<Vec<CanvasData>>>,
        executions: Rc<RefCell<Vec<ExecutionNotice>>>,
    }

    impl CanvasObserver for Recorder {
        fn on_data_change(&mut self, data: &CanvasData) {
            self.changes.borrow_mut().push(data.clone());
        }

        fn on_execute(&mut self, notice: &ExecutionNotice) {
            self.executions.borrow_mut().push(notice.clone());
        }
    }

    fn engine() -> CanvasEngine {
        CanvasEngine::new("test", Viewport::default(), EngineConfig::default())
    }

    fn add_rect(engine: &mut CanvasEngine, x: f64, y: f64, w: f64, h: f64) -> NodeId {
        let id = engine.add_node(DiagramKind::Rectangle, x, y).unwrap();
        let mut node = get_by_id(engine.items(), id).unwrap().clone();
        node.set_shape(&Shape::new(x, y, w, h));
        engine.update_node(node);
        id
    }

    fn shape_of(engine: &CanvasEngine, id: NodeId) -> Shape {
        get_by_id(engine.items(), id).unwrap().shape().unwrap()
    }

    #[test]
    fn pointer_drag_moves_and_commits_once() {
        let mut e = engine();
        let id = add_rect(&mut e, 100.0, 100.0, 50.0, 50.0);
        let entries = e.history().len();

        e.pointer_down(Point::new(100.0, 100.0), false);
        assert_eq!(e.mode(), &InteractionMode::Dragging(id));
        e.pointer_move(Point::new(120.0, 110.0));
        assert!(get_by_id(e.items(), id).unwrap().ui.is_dragging);
        assert_eq!(e.history().len(), entries);
        e.pointer_up(Point::new(130.0, 90.0));

        assert_eq!(shape_of(&e, id), Shape::new(130.0, 90.0, 50.0, 50.0));
        assert_eq!(e.history().len(), entries + 1);
        assert_eq!(e.mode(), &InteractionMode::Idle);
        assert!(!get_by_id(e.items(), id).unwrap().ui.is_dragging);
    }

    #[test]
    fn right_handle_drag_widens_from_left_edge() {
        let mut e = engine();
        let id = add_rect(&mut e, 100.0, 100.0, 50.0, 50.0);
        assert!(e.start_transform(id, TransformHandle::Right, Point::new(125.0, 100.0)));
        e.pointer_move(Point::new(150.0, 100.0));
        e.pointer_up(Point::new(175.0, 100.0));
        assert_eq!(shape_of(&e, id), Shape::new(125.0, 100.0, 100.0, 50.0));
    }

    #[test]
    fn in_progress_events_are_not_committed() {
        let mut e = engine();
        let changes = Rc::new(RefCell::new(Vec::new()));
        e.subscribe(Box::new(Recorder {
            changes: Rc::clone(&changes),
            ..Default::default()
        }));
        let id = add_rect(&mut e, 0.0, 0.0, 40.0, 40.0);
        let before = changes.borrow().len();

        let s = Point::new(0.0, 0.0);
        e.handle_drag(id, &DragEvent::new(EventPhase::Start, s, s));
        e.handle_drag(id, &DragEvent::new(EventPhase::InProgress, s, Point::new(5.0, 0.0)));
        e.handle_drag(id, &DragEvent::new(EventPhase::InProgress, s, Point::new(10.0, 0.0)));
        assert_eq!(changes.borrow().len(), before);
        e.handle_drag(id, &DragEvent::new(EventPhase::End, s, Point::new(15.0, 0.0)));

        assert_eq!(changes.borrow().len(), before + 1);
        assert_eq!(changes.borrow()[before].items[0].x, 15.0);
    }

    #[test]
    fn replayed_end_transform_changes_nothing() {
        let mut e = engine();
        let id = add_rect(&mut e, 0.0, 0.0, 40.0, 20.0);
        let start = shape_of(&e, id);
        let end = Shape {
            rotation: 30.0,
            ..Shape::new(12.0, -4.0, 60.0, 20.0)
        };
        let event = TransformEvent {
            phase: EventPhase::End,
            start_shape: start,
            end_shape: end,
        };
        e.handle_transform(id, &event);
        let once = e.items().to_vec();
        e.handle_transform(id, &event);
        assert_eq!(e.items(), once.as_slice());
    }

    #[test]
    fn stale_start_shape_does_not_move_the_baseline() {
        let grouped = || {
            let mut e = engine();
            let a = add_rect(&mut e, 0.0, 0.0, 20.0, 20.0);
            let b = add_rect(&mut e, 100.0, 0.0, 20.0, 20.0);
            e.select_all();
            assert!(e.group());
            let group = selection::selected_ids(e.items())[0];
            (e, group, a, b)
        };
        let end = Shape::new(100.0, 50.0, 240.0, 20.0);
        let run = |start_shape: Shape| {
            let (mut e, group, a, b) = grouped();
            e.handle_transform(
                group,
                &TransformEvent {
                    phase: EventPhase::Instant,
                    start_shape,
                    end_shape: end,
                },
            );
            (shape_of(&e, a), shape_of(&e, b))
        };
        let (e, group, _, _) = grouped();
        let actual = shape_of(&e, group);

        let stale = run(Shape::new(-500.0, 0.0, 10.0, 10.0));
        assert_eq!(stale, run(actual));
        assert_eq!(stale.0.center(), Point::new(0.0, 50.0));
    }

    #[test]
    fn marquee_follows_edge_scroll() {
        let mut e = engine();
        e.pointer_down(Point::new(400.0, 300.0), false);
        assert!(matches!(e.mode(), InteractionMode::AreaSelecting(_)));
        assert_eq!(e.pointer_move(Point::new(795.0, 300.0)), ScrollChange::Started);
        assert!(e.auto_scroll_tick());
        assert_eq!(e.viewport().min_x, 8.0);
        let InteractionMode::AreaSelecting(area) = e.mode() else {
            panic!("expected area selection");
        };
        assert_eq!(area.end, Point::new(803.0, 300.0));
        e.pointer_up(Point::new(795.0, 300.0));
        assert_eq!(e.mode(), &InteractionMode::Idle);
        assert!(!e.auto_scroll_tick());
    }

    #[test]
    fn area_selection_selects_enclosed_nodes() {
        let mut e = engine();
        let a = add_rect(&mut e, 100.0, 100.0, 40.0, 40.0);
        let b = add_rect(&mut e, 200.0, 100.0, 40.0, 40.0);
        let far = add_rect(&mut e, 500.0, 500.0, 40.0, 40.0);
        e.pointer_down(Point::new(20.0, 20.0), false);
        e.pointer_move(Point::new(250.0, 200.0));
        e.pointer_up(Point::new(250.0, 200.0));
        assert_eq!(selection::selected_ids(e.items()), vec![a, b]);
        assert!(!get_by_id(e.items(), far).unwrap().is_selected());
        assert!(e.multi_select_group().is_some());
    }

    #[test]
    fn ctrl_marquee_adds_to_the_selection() {
        let mut e = engine();
        let a = add_rect(&mut e, 100.0, 100.0, 40.0, 40.0);
        let b = add_rect(&mut e, 200.0, 100.0, 40.0, 40.0);
        let c = add_rect(&mut e, 500.0, 500.0, 40.0, 40.0);
        e.handle_select(&SelectEvent {
            id: c,
            is_multi_select: false,
        });

        e.pointer_down(Point::new(20.0, 20.0), true);
        e.pointer_move(Point::new(250.0, 200.0));
        e.pointer_up(Point::new(250.0, 200.0));
        assert_eq!(selection::selected_ids(e.items()), vec![a, b, c]);
        assert!(e.multi_select_group().is_some());
    }

    #[test]
    fn connect_gesture_creates_pinned_line() {
        let mut e = engine();
        let a = add_rect(&mut e, 0.0, 0.0, 100.0, 100.0);
        let b = add_rect(&mut e, 300.0, 0.0, 100.0, 100.0);
        let east = get_by_id(e.items(), a).unwrap().connect_points()[3].id;
        let west = get_by_id(e.items(), b).unwrap().connect_points()[2].id;

        // Shift the viewport so client and canvas coordinates differ.
        e.set_viewport(Viewport {
            min_x: -100.0,
            min_y: -100.0,
            ..Viewport::default()
        });
        assert!(e.start_connect(east, Point::new(150.0, 100.0)));
        let shows = |e: &CanvasEngine, id| get_by_id(e.items(), id).unwrap().ui.show_connect_points;
        assert!(shows(&e, b));
        assert!(!shows(&e, a));
        e.pointer_move(Point::new(300.0, 100.0));
        let InteractionMode::Connecting { preview, .. } = e.mode() else {
            panic!("expected connecting");
        };
        assert_eq!(preview.first(), Some(&Point::new(50.0, 0.0)));
        e.pointer_up(Point::new(360.0, 110.0));

        let line = e.items().last().unwrap();
        assert_eq!(line.kind, DiagramKind::ConnectLine);
        assert_eq!(line.children().first().unwrap().id, east);
        assert_eq!(line.children().last().unwrap().id, west);
        assert!(e.items().iter().all(|d| !d.ui.show_connect_points));
    }

    #[test]
    fn connect_dropped_on_empty_canvas_adds_nothing() {
        let mut e = engine();
        let a = add_rect(&mut e, 0.0, 0.0, 100.0, 100.0);
        let east = get_by_id(e.items(), a).unwrap().connect_points()[3].id;
        let entries = e.history().len();
        e.start_connect(east, Point::new(50.0, 0.0));
        e.pointer_up(Point::new(400.0, 400.0));
        assert_eq!(e.items().len(), 1);
        assert_eq!(e.history().len(), entries);
    }

    #[test]
    fn midpoint_click_without_move_leaves_line_alone() {
        let mut e = engine();
        let a = add_rect(&mut e, 0.0, 0.0, 100.0, 100.0);
        let b = add_rect(&mut e, 300.0, 200.0, 100.0, 100.0);
        let east = get_by_id(e.items(), a).unwrap().connect_points()[3].id;
        let west = get_by_id(e.items(), b).unwrap().connect_points()[2].id;
        let line = connect::create_connect_line(e.items(), east, west, e.config()).unwrap();
        let line_id = line.id;
        e.state.items.push(line);
        let before = e.items().to_vec();

        assert!(e.start_midpoint_drag(line_id, 0, Point::new(0.0, 0.0)));
        e.pointer_up(Point::new(0.0, 0.0));
        assert_eq!(e.items(), before.as_slice());
    }

    #[test]
    fn midpoint_drag_inserts_a_real_vertex() {
        let mut e = engine();
        let a = add_rect(&mut e, 0.0, 0.0, 100.0, 100.0);
        let b = add_rect(&mut e, 300.0, 200.0, 100.0, 100.0);
        let east = get_by_id(e.items(), a).unwrap().connect_points()[3].id;
        let west = get_by_id(e.items(), b).unwrap().connect_points()[2].id;
        let line = connect::create_connect_line(e.items(), east, west, e.config()).unwrap();
        let (line_id, count) = (line.id, line.children().len());
        e.state.items.push(line);

        e.start_midpoint_drag(line_id, 0, Point::new(60.0, 0.0));
        e.pointer_move(Point::new(60.0, -40.0));
        e.pointer_up(Point::new(60.0, -40.0));

        let line = get_by_id(e.items(), line_id).unwrap();
        assert_eq!(line.children().len(), count + 1);
        assert!(line.children().iter().all(|v| !v.id.is_reserved()));
        assert!(!line.line.as_ref().unwrap().auto_routing);
        assert_eq!(line.children()[1].position(), Point::new(60.0, -40.0));
    }

    #[test]
    fn failed_group_keeps_state() {
        let mut e = engine();
        let a = add_rect(&mut e, 0.0, 0.0, 20.0, 20.0);
        e.handle_select(&SelectEvent {
            id: a,
            is_multi_select: false,
        });
        let before = e.items().to_vec();
        let entries = e.history().len();
        assert!(!e.group());
        assert_eq!(e.items(), before.as_slice());
        assert_eq!(e.history().len(), entries);
    }

    #[test]
    fn execute_reports_downstream_owners() {
        let mut e = engine();
        let executions = Rc::new(RefCell::new(Vec::new()));
        e.subscribe(Box::new(Recorder {
            executions: Rc::clone(&executions),
            ..Default::default()
        }));
        let llm = e.add_node(DiagramKind::LlmNode, 0.0, 0.0).unwrap();
        let out = e.add_node(DiagramKind::TextAreaNode, 600.0, 0.0).unwrap();
        let from = get_by_id(e.items(), llm).unwrap().connect_points()[3].id;
        let to = get_by_id(e.items(), out).unwrap().connect_points()[2].id;
        let line = connect::create_connect_line(e.items(), from, to, e.config()).unwrap();
        e.state.items.push(line);

        e.execute(&ExecuteEvent {
            id: llm,
            data: serde_json::json!({"prompt": "hi"}),
        });
        let notices = executions.borrow();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].downstream, vec![out]);
    }

    #[test]
    fn undo_during_gesture_is_ignored() {
        let mut e = engine();
        let id = add_rect(&mut e, 0.0, 0.0, 20.0, 20.0);
        e.start_drag(id, Point::new(0.0, 0.0));
        assert!(!e.undo());
        e.pointer_up(Point::new(10.0, 0.0));
        assert!(e.undo());
        assert_eq!(shape_of(&e, id).x, 0.0);
    }
}
