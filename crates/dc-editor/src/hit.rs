//! Hit testing: point → node lookup.
//!
//! Walks the tree front-to-back (later siblings paint on top) to find
//! which node is at a canvas position.

use dc_core::geometry::{Bounds, Point, segment_intersects_bounds};
use dc_core::id::NodeId;
use dc_core::model::{Diagram, DiagramKind};

/// Pick tolerance around polylines, in canvas units.
const LINE_TOLERANCE: f64 = 4.0;

fn hits(node: &Diagram, p: Point) -> bool {
    match node.kind {
        DiagramKind::PathPoint => false,
        // Groups are hit through their children.
        DiagramKind::Group => false,
        DiagramKind::Path | DiagramKind::ConnectLine => {
            let probe = Bounds::new(p.x, p.y, LINE_TOLERANCE * 2.0, LINE_TOLERANCE * 2.0);
            node.vertices()
                .windows(2)
                .any(|w| probe.contains_point(w[0]) || segment_intersects_bounds(w[0], w[1], &probe))
        }
        _ => node.shape().is_some_and(|s| s.contains_point(p)),
    }
}

/// Find the topmost node at `p`. Returns `None` on empty canvas.
pub fn hit_test(items: &[Diagram], p: Point) -> Option<NodeId> {
    for item in items.iter().rev() {
        if let Some(hit) = hit_test(item.children(), p) {
            return Some(hit);
        }
        if hits(item, p) {
            return Some(item.id);
        }
    }
    None
}

/// All nodes (any depth) whose bounds lie fully inside `area`.
pub fn nodes_within(items: &[Diagram], area: &Bounds) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_within(items, area, &mut out);
    out
}

fn collect_within(items: &[Diagram], area: &Bounds, out: &mut Vec<NodeId>) {
    for item in items {
        if item.kind != DiagramKind::PathPoint && area.contains_bounds(&item.bounds()) {
            out.push(item.id);
        }
        collect_within(item.children(), area, out);
    }
}
