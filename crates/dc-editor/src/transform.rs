//! Transform engine: drag, resize and rotate of a node and its subtree.
//!
//! A gesture captures a `TransformBaseline` at `Start`. Every later tick
//! recomputes the whole subtree from that baseline and the single global
//! start→end shape delta, so ticks never compound rounding error. After a
//! recompute the touched connectors are refreshed and every ancestor group
//! is refit bottom-up.

use crate::config::EngineConfig;
use crate::connect;
use dc_core::geometry::{
    Point, Shape, bounding_box_of_points, degrees_to_radians, normalize_degrees, radians_to_degrees,
    rotate_point,
};
use dc_core::id::NodeId;
use dc_core::model::{Diagram, DiagramKind, ancestors_of, collect_ids, replace_by_ids};
use dc_core::registry;
use std::collections::{HashMap, HashSet};

// ─── Handles ─────────────────────────────────────────────────────────────

/// The grip a transform gesture started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformHandle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    Rotation,
}

impl TransformHandle {
    /// Which side of each axis the handle sits on (-1, 0 or 1).
    fn sides(self) -> (f64, f64) {
        match self {
            TransformHandle::TopLeft => (-1.0, -1.0),
            TransformHandle::Top => (0.0, -1.0),
            TransformHandle::TopRight => (1.0, -1.0),
            TransformHandle::Right => (1.0, 0.0),
            TransformHandle::BottomRight => (1.0, 1.0),
            TransformHandle::Bottom => (0.0, 1.0),
            TransformHandle::BottomLeft => (-1.0, 1.0),
            TransformHandle::Left => (-1.0, 0.0),
            TransformHandle::Rotation => (0.0, 0.0),
        }
    }

    pub fn is_corner(self) -> bool {
        let (sx, sy) = self.sides();
        sx != 0.0 && sy != 0.0
    }
}

/// Move a shape by a canvas-space offset.
pub fn translate_shape(start: &Shape, dx: f64, dy: f64) -> Shape {
    start.translated(dx, dy)
}

/// New extent along one axis: the edge opposite the handle stays put and
/// the handle edge follows the cursor. Returns (size, local center, flipped).
fn resize_axis(size: f64, side: f64, cursor: f64, min_size: f64) -> (f64, f64, bool) {
    if side == 0.0 {
        return (size, 0.0, false);
    }
    let fixed = -side * size / 2.0;
    let reach = cursor - fixed;
    let flipped = reach * side < 0.0;
    let new_size = reach.abs().max(min_size);
    let direction = if flipped { -side } else { side };
    (new_size, fixed + direction * new_size / 2.0, flipped)
}

/// End shape for dragging `handle` of `start` to `cursor` (canvas space).
///
/// Dragging past the opposite edge mirrors the shape: the size stays
/// positive and the matching `scale` sign flips.
pub fn resize_by_handle(
    start: &Shape,
    handle: TransformHandle,
    cursor: Point,
    keep_proportion: bool,
    min_size: f64,
) -> Shape {
    if handle == TransformHandle::Rotation {
        return rotate_by_handle(start, cursor);
    }
    let center = start.center();
    let radians = degrees_to_radians(start.rotation);
    let local = rotate_point(cursor, center, -radians);
    let (side_x, side_y) = handle.sides();

    let (mut width, mut cx, flip_x) = resize_axis(start.width, side_x, local.x - center.x, min_size);
    let (mut height, mut cy, flip_y) = resize_axis(start.height, side_y, local.y - center.y, min_size);

    if keep_proportion && start.width > 0.0 && start.height > 0.0 {
        let ratio = if handle.is_corner() {
            (width / start.width).max(height / start.height)
        } else if side_x != 0.0 {
            width / start.width
        } else {
            height / start.height
        };
        let (new_w, new_h) = (start.width * ratio, start.height * ratio);
        // Keep the fixed edge(s) anchored while the size snaps to the ratio.
        if side_x != 0.0 {
            let dir = if flip_x { -side_x } else { side_x };
            cx = -side_x * start.width / 2.0 + dir * new_w / 2.0;
        }
        if side_y != 0.0 {
            let dir = if flip_y { -side_y } else { side_y };
            cy = -side_y * start.height / 2.0 + dir * new_h / 2.0;
        }
        width = new_w;
        height = new_h;
    }

    let moved = rotate_point(Point::new(center.x + cx, center.y + cy), center, radians);
    Shape {
        x: moved.x,
        y: moved.y,
        width,
        height,
        rotation: start.rotation,
        scale_x: if flip_x { -start.scale_x } else { start.scale_x },
        scale_y: if flip_y { -start.scale_y } else { start.scale_y },
    }
}

/// End shape for dragging the rotation grip (above the box) to `cursor`.
pub fn rotate_by_handle(start: &Shape, cursor: Point) -> Shape {
    let angle = radians_to_degrees((cursor.y - start.y).atan2(cursor.x - start.x));
    Shape {
        rotation: normalize_degrees(angle + 90.0),
        ..*start
    }
}

// ─── Subtree recompute ───────────────────────────────────────────────────

/// State captured when a transform gesture starts.
#[derive(Debug, Clone)]
pub struct TransformBaseline {
    /// The target as it was, with its whole subtree.
    pub target: Diagram,
    /// The canvas before the gesture; connectors are refreshed from it.
    pub canvas: Vec<Diagram>,
}

impl TransformBaseline {
    pub fn capture(items: &[Diagram], target: &Diagram) -> Self {
        Self {
            target: target.clone(),
            canvas: items.to_vec(),
        }
    }

    pub fn start_shape(&self) -> Option<Shape> {
        self.target.shape()
    }
}

fn scale_ratio(end: f64, start: f64) -> f64 {
    if start.abs() < f64::EPSILON { 1.0 } else { end / start }
}

/// Recompute a descendant of a transformed node from its baseline.
pub fn transform_descendant(item: &Diagram, s: &Shape, e: &Shape) -> Diagram {
    if s == e {
        return item.clone();
    }
    let group_sx = scale_ratio(e.width, s.width);
    let group_sy = scale_ratio(e.height, s.height);

    let inv = rotate_point(item.position(), s.center(), -degrees_to_radians(s.rotation));
    let dx = (inv.x - s.x) * s.scale_x * e.scale_x;
    let dy = (inv.y - s.y) * s.scale_y * e.scale_y;
    let center = rotate_point(
        Point::new(e.x + dx * group_sx, e.y + dy * group_sy),
        e.center(),
        degrees_to_radians(e.rotation),
    );

    let mut next = item.clone();
    next.x = center.x;
    next.y = center.y;
    if let Some(t) = next.transform.as_mut() {
        t.width *= group_sx;
        t.height *= group_sy;
        t.rotation = normalize_degrees(t.rotation + e.rotation - s.rotation);
        t.scale_x = e.scale_x;
        t.scale_y = e.scale_y;
    }
    if let Some(children) = item.items.as_ref() {
        next.items = Some(children.iter().map(|c| transform_descendant(c, s, e)).collect());
    }
    registry::with_updated_connect_points(&next)
}

/// The gesture target itself takes the end shape exactly; its subtree
/// follows through `transform_descendant`.
pub fn transform_target(target: &Diagram, s: &Shape, e: &Shape) -> Diagram {
    let mut next = target.clone();
    next.set_shape(e);
    if let Some(children) = target.items.as_ref() {
        next.items = Some(children.iter().map(|c| transform_descendant(c, s, e)).collect());
    }
    registry::with_updated_connect_points(&next)
}

/// Apply one tick of a transform gesture to the canvas.
///
/// Returns the new tree and the recomputed target. For the synthetic
/// multi-select group only its members are written back into the tree.
pub fn apply_transform(
    items: &[Diagram],
    baseline: &TransformBaseline,
    end: &Shape,
    config: &EngineConfig,
) -> (Vec<Diagram>, Diagram) {
    let Some(start) = baseline.start_shape() else {
        log::warn!("{} has no shape to transform", baseline.target.id);
        return (items.to_vec(), baseline.target.clone());
    };
    let moved = transform_target(&baseline.target, &start, end);

    let written: Vec<Diagram> = if moved.id == NodeId::multi_select_group() {
        moved.children().to_vec()
    } else {
        vec![moved.clone()]
    };
    let replacements: HashMap<NodeId, Diagram> = written.iter().map(|d| (d.id, d.clone())).collect();
    let tree = replace_by_ids(items, &replacements);

    let touched: HashSet<NodeId> = collect_ids(&written).into_iter().collect();
    let (tree, rerouted) = connect::refresh_connect_lines(&tree, &baseline.canvas, &touched, config);

    let mut dirty: Vec<NodeId> = written.iter().map(|d| d.id).collect();
    dirty.extend(rerouted);
    log::trace!("transform {} touched {} nodes", moved.id, touched.len());
    (refit_ancestors(&tree, &dirty), moved)
}

// ─── Fitting ─────────────────────────────────────────────────────────────

/// Refit a path or connector box to its vertices.
pub fn fit_to_vertices(node: &Diagram) -> Diagram {
    let mut next = node.clone();
    let Some(t) = next.transform.as_mut() else {
        return next;
    };
    if let Some(b) = bounding_box_of_points(&node.vertices(), t.rotation, t.scale_x, t.scale_y) {
        t.width = b.width;
        t.height = b.height;
        next.x = b.x;
        next.y = b.y;
    }
    next
}

/// Refit a group box to its children, measured in the group's own frame.
pub fn fit_group(group: &Diagram) -> Diagram {
    let mut next = group.clone();
    let points: Vec<Point> = group.children().iter().flat_map(Diagram::outline_points).collect();
    let Some(t) = next.transform.as_mut() else {
        return next;
    };
    if let Some(b) = bounding_box_of_points(&points, t.rotation, t.scale_x, t.scale_y) {
        t.width = b.width;
        t.height = b.height;
        next.x = b.x;
        next.y = b.y;
    }
    next
}

fn refit(node: &Diagram) -> Diagram {
    match node.kind {
        DiagramKind::Group => fit_group(node),
        DiagramKind::Path | DiagramKind::ConnectLine => fit_to_vertices(node),
        _ => node.clone(),
    }
}

/// Refit every ancestor of `changed`, innermost first.
pub fn refit_ancestors(items: &[Diagram], changed: &[NodeId]) -> Vec<Diagram> {
    let ancestors: HashSet<NodeId> = changed
        .iter()
        .flat_map(|id| ancestors_of(items, *id))
        .collect();
    refit_containers(items, &ancestors)
}

/// Refit `containers` and all of their ancestors, innermost first.
pub fn refit_containers(items: &[Diagram], containers: &HashSet<NodeId>) -> Vec<Diagram> {
    if containers.is_empty() {
        return items.to_vec();
    }
    let closed: HashSet<NodeId> = containers
        .iter()
        .flat_map(|id| std::iter::once(*id).chain(ancestors_of(items, *id)))
        .collect();

    fn visit(items: &[Diagram], dirty: &HashSet<NodeId>) -> Vec<Diagram> {
        items
            .iter()
            .map(|item| {
                if !dirty.contains(&item.id) {
                    return item.clone();
                }
                let mut next = item.clone();
                next.items = item.items.as_ref().map(|c| visit(c, dirty));
                refit(&next)
            })
            .collect()
    }
    visit(items, &closed)
}
