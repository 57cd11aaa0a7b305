//! Connectors: creation, live preview, refresh after owner moves, and
//! manual vertex editing.
//!
//! A ConnectLine stores its vertices as `PathPoint` children. The first and
//! last vertex ids are the ids of the connect points the line is attached
//! to; interior vertex ids are fresh. Auto-routed lines are rebuilt from
//! their owners' current geometry; manual lines keep their interior
//! vertices and only re-pin their ends.

use crate::config::EngineConfig;
use crate::input::ConnectEvent;
use crate::routing::{RouteEnd, is_orthogonal, route_orthogonal, simplify_orthogonal};
use crate::transform::fit_to_vertices;
use dc_core::geometry::{Bounds, Direction, EPSILON, Point, nearest_axis_direction, segments_intersect};
use dc_core::id::NodeId;
use dc_core::model::{ConnectPoint, Diagram, DiagramIndex, DiagramKind, map_recursive, walk};
use dc_core::registry;
use std::collections::HashSet;

// ─── Attachments ─────────────────────────────────────────────────────────

/// Routing description of a connect point on its owner.
pub fn route_end(owner: &Diagram, point: &ConnectPoint) -> RouteEnd {
    RouteEnd {
        point: point.position(),
        direction: nearest_axis_direction(owner.position(), point.position()),
        owner: owner.bounds(),
    }
}

/// Owner node and connect point for a connect point id.
pub fn attachment<'a>(
    items: &'a [Diagram],
    index: &DiagramIndex,
    point_id: NodeId,
) -> Option<(&'a Diagram, &'a ConnectPoint)> {
    let owner = index.get(items, index.owner_of_point(point_id)?)?;
    let point = owner.connect_points().iter().find(|cp| cp.id == point_id)?;
    Some((owner, point))
}

fn vertices_match(a: &[Point], b: &[Point]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.approx_eq(*q))
}

/// `line` with its vertex list replaced. `ids` supplies ids by position;
/// missing entries get fresh ids.
fn with_vertices(line: &Diagram, ids: &[Option<NodeId>], points: &[Point]) -> Diagram {
    let mut next = line.clone();
    next.items = Some(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let id = ids.get(i).copied().flatten().unwrap_or_else(NodeId::fresh);
                Diagram::path_point(id, p.x, p.y)
            })
            .collect(),
    );
    fit_to_vertices(&next)
}

/// Vertices with endpoint ids pinned and fresh interior ids.
fn pinned_ids(first: NodeId, last: NodeId, len: usize) -> Vec<Option<NodeId>> {
    (0..len)
        .map(|i| match i {
            0 => Some(first),
            i if i + 1 == len => Some(last),
            _ => None,
        })
        .collect()
}

// ─── Creation ────────────────────────────────────────────────────────────

fn new_line(start_owner: NodeId, end_owner: NodeId) -> Option<Diagram> {
    let mut line = registry::create(DiagramKind::ConnectLine, 0.0, 0.0)?;
    if let Some(ends) = line.line.as_mut() {
        ends.start_owner_id = start_owner;
        ends.end_owner_id = end_owner;
    }
    Some(line)
}

/// Create an auto-routed connector between two connect points.
/// `None` when either point is unknown or both sit on the same owner.
pub fn create_connect_line(
    items: &[Diagram],
    start_point: NodeId,
    end_point: NodeId,
    config: &EngineConfig,
) -> Option<Diagram> {
    let index = DiagramIndex::build(items);
    let (start_owner, start_cp) = attachment(items, &index, start_point)?;
    let (end_owner, end_cp) = attachment(items, &index, end_point)?;
    if start_owner.id == end_owner.id {
        log::debug!("refusing to connect {} to itself", start_owner.id);
        return None;
    }

    let route = route_orthogonal(
        &route_end(start_owner, start_cp),
        &route_end(end_owner, end_cp),
        config.connect_margin,
        config.bend_penalty,
    );
    let line = new_line(start_owner.id, end_owner.id)?;
    Some(with_vertices(&line, &pinned_ids(start_point, end_point, route.len()), &route))
}

/// Build a connector from a validated `ConnectEvent`, keeping its vertices.
pub fn line_from_event(event: &ConnectEvent) -> Option<Diagram> {
    let line = new_line(event.start_owner_id, event.end_owner_id)?;
    let ids: Vec<Option<NodeId>> = event.points.iter().map(|p| Some(p.id)).collect();
    let points: Vec<Point> = event.points.iter().map(|p| p.position()).collect();
    Some(with_vertices(&line, &ids, &points))
}

// ─── Preview ─────────────────────────────────────────────────────────────

/// The box edges facing toward and away from an anchor direction.
fn near_far_edges(owner: &Bounds, end: &RouteEnd) -> [(Point, Point); 2] {
    let (l, r, t, b) = (owner.left(), owner.right(), owner.top(), owner.bottom());
    let left = (Point::new(l, t), Point::new(l, b));
    let right = (Point::new(r, t), Point::new(r, b));
    let top = (Point::new(l, t), Point::new(r, t));
    let bottom = (Point::new(l, b), Point::new(r, b));
    match end.direction {
        Direction::Right => [right, left],
        Direction::Left => [left, right],
        Direction::Up => [top, bottom],
        Direction::Down => [bottom, top],
    }
}

/// Live path from a connect point to the cursor during a connect gesture.
///
/// The path leaves the owner along the point's outward axis, clears the
/// margin, then bends toward the cursor. When the final leg would cut back
/// through the owner, it detours around the side nearer the cursor.
pub fn preview_path(owner: &Diagram, point: &ConnectPoint, cursor: Point, margin: f64) -> Vec<Point> {
    let end = route_end(owner, point);
    let stub = end.stub(margin);
    let ob = end.owner;
    let horizontal = end.direction.is_horizontal();
    let bend = if horizontal {
        Point::new(stub.x, cursor.y)
    } else {
        Point::new(cursor.x, stub.y)
    };

    let edges = near_far_edges(&ob, &end);
    let recrosses = |a: Point, b: Point| edges.iter().any(|(e1, e2)| segments_intersect(a, b, *e1, *e2));

    let mut points = vec![point.position(), stub];
    if recrosses(stub, bend) || recrosses(bend, cursor) {
        if horizontal {
            let y = if cursor.y < ob.y { ob.top() - margin } else { ob.bottom() + margin };
            points.push(Point::new(stub.x, y));
            points.push(Point::new(cursor.x, y));
        } else {
            let x = if cursor.x < ob.x { ob.left() - margin } else { ob.right() + margin };
            points.push(Point::new(x, stub.y));
            points.push(Point::new(x, cursor.y));
        }
    } else {
        points.push(bend);
    }
    points.push(cursor);
    simplify_orthogonal(points)
}

// ─── Refresh ─────────────────────────────────────────────────────────────

/// Rebuild an auto-routed line from its owners' current connect points.
/// Endpoint ids are kept; interior ids are regenerated.
pub fn reroute(items: &[Diagram], index: &DiagramIndex, line: &Diagram, config: &EngineConfig) -> Option<Diagram> {
    let first = line.children().first()?.id;
    let last = line.children().last()?.id;
    let (start_owner, start_cp) = attachment(items, index, first)?;
    let (end_owner, end_cp) = attachment(items, index, last)?;
    let route = route_orthogonal(
        &route_end(start_owner, start_cp),
        &route_end(end_owner, end_cp),
        config.connect_margin,
        config.bend_penalty,
    );
    Some(with_vertices(line, &pinned_ids(first, last, route.len()), &route))
}

/// Move a manual line's ends onto their connect points. The vertex next to
/// each end follows it along the axis of their shared segment.
pub fn reattach(items: &[Diagram], index: &DiagramIndex, line: &Diagram) -> Option<Diagram> {
    let ids: Vec<Option<NodeId>> = line.children().iter().map(|v| Some(v.id)).collect();
    let before = line.vertices();
    let n = before.len();
    if n < 2 {
        return None;
    }
    let (_, start_cp) = attachment(items, index, line.children()[0].id)?;
    let (_, end_cp) = attachment(items, index, line.children()[n - 1].id)?;

    let mut after = before.clone();
    for (end, neighbor, target) in [(0, 1, start_cp.position()), (n - 1, n - 2, end_cp.position())] {
        after[end] = target;
        if neighbor == 0 || neighbor == n - 1 {
            continue;
        }
        if (before[end].y - before[neighbor].y).abs() < EPSILON {
            after[neighbor].y = target.y;
        } else if (before[end].x - before[neighbor].x).abs() < EPSILON {
            after[neighbor].x = target.x;
        }
    }
    Some(with_vertices(line, &ids, &after))
}

/// Refresh every connector attached to a touched node.
///
/// Lines that moved with the gesture are refreshed from their current
/// vertices; the rest from their pre-gesture version in `baseline`, so
/// repeated ticks do not drift. A line whose vertices come out unchanged
/// is left as is, ids included. Returns the new tree and the ids of the
/// lines that changed.
pub fn refresh_connect_lines(
    items: &[Diagram],
    baseline: &[Diagram],
    touched: &HashSet<NodeId>,
    config: &EngineConfig,
) -> (Vec<Diagram>, Vec<NodeId>) {
    let index = DiagramIndex::build(items);
    let baseline_index = DiagramIndex::build(baseline);
    let mut changed = Vec::new();

    let tree = map_recursive(items, &mut |node| {
        let Some(ends) = node.line.as_ref() else {
            return node.clone();
        };
        if !touched.contains(&ends.start_owner_id) && !touched.contains(&ends.end_owner_id) {
            return node.clone();
        }
        let source = if touched.contains(&node.id) {
            node
        } else {
            baseline_index.get(baseline, node.id).unwrap_or(node)
        };
        let refreshed = if ends.auto_routing {
            reroute(items, &index, source, config)
        } else {
            reattach(items, &index, source)
        };
        match refreshed {
            Some(next) if !vertices_match(&next.vertices(), &node.vertices()) => {
                changed.push(node.id);
                next
            }
            Some(_) => node.clone(),
            None => {
                log::warn!("connector {} lost an attachment, left unchanged", node.id);
                node.clone()
            }
        }
    });
    (tree, changed)
}

/// Ids of connectors attached to any of `owners`.
pub fn lines_attached_to(items: &[Diagram], owners: &HashSet<NodeId>) -> HashSet<NodeId> {
    let mut out = HashSet::new();
    walk(items, &mut |d| {
        if let Some(ends) = &d.line
            && (owners.contains(&ends.start_owner_id) || owners.contains(&ends.end_owner_id))
        {
            out.insert(d.id);
        }
    });
    out
}

/// End owners of connectors starting at `id`, in tree order.
pub fn downstream_of(items: &[Diagram], id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    walk(items, &mut |d| {
        if let Some(ends) = &d.line
            && ends.start_owner_id == id
            && !out.contains(&ends.end_owner_id)
        {
            out.push(ends.end_owner_id);
        }
    });
    out
}

// ─── Manual editing ──────────────────────────────────────────────────────

fn manual(mut line: Diagram) -> Diagram {
    if let Some(ends) = line.line.as_mut() {
        ends.auto_routing = false;
    }
    line
}

/// Drag vertex `index` of `line` to `to`. Endpoints are pinned to their
/// connect points and never move. On an axis-aligned line the neighbors
/// shift along the perpendicular axis so every corner stays square; a
/// neighbor that is an endpoint constrains the dragged vertex instead.
pub fn move_vertex(line: &Diagram, index: usize, to: Point) -> Diagram {
    let before = line.vertices();
    let n = before.len();
    if index == 0 || index + 1 >= n {
        log::debug!("vertex {index} of {} is pinned", line.id);
        return line.clone();
    }

    let mut after = before.clone();
    let mut target = to;
    if is_orthogonal(&before) {
        let neighbors = [index - 1, index + 1];
        let horizontal = |j: usize| (before[j].y - before[index].y).abs() < EPSILON;
        for &j in &neighbors {
            if j == 0 || j == n - 1 {
                if horizontal(j) {
                    target.y = before[index].y;
                } else {
                    target.x = before[index].x;
                }
            }
        }
        for &j in &neighbors {
            if j != 0 && j != n - 1 {
                if horizontal(j) {
                    after[j].y = target.y;
                } else {
                    after[j].x = target.x;
                }
            }
        }
    }
    after[index] = target;

    let ids: Vec<Option<NodeId>> = line.children().iter().map(|v| Some(v.id)).collect();
    manual(with_vertices(line, &ids, &after))
}

/// Insert a placeholder vertex at the midpoint of segment `segment`
/// (between vertices `segment` and `segment + 1`).
pub fn insert_vertex(line: &Diagram, segment: usize) -> Option<Diagram> {
    let children = line.children();
    let (a, b) = (children.get(segment)?, children.get(segment + 1)?);
    let mid = Diagram::path_point(NodeId::new_vertex(), (a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    let mut items = children.to_vec();
    items.insert(segment + 1, mid);
    let mut next = line.clone();
    next.items = Some(items);
    Some(manual(fit_to_vertices(&next)))
}

/// Move the placeholder vertex freely to `to`.
pub fn move_new_vertex(line: &Diagram, to: Point) -> Diagram {
    let mut next = line.clone();
    if let Some(items) = next.items.as_mut()
        && let Some(v) = items.iter_mut().find(|v| v.id == NodeId::new_vertex())
    {
        v.x = to.x;
        v.y = to.y;
    }
    fit_to_vertices(&next)
}

/// Give the placeholder vertex a real id.
pub fn finalize_new_vertex(line: &Diagram) -> Diagram {
    let mut next = line.clone();
    if let Some(items) = next.items.as_mut() {
        for v in items.iter_mut().filter(|v| v.id == NodeId::new_vertex()) {
            v.id = NodeId::fresh();
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteEnd;
    use dc_core::geometry::Shape;
    use dc_core::model::get_by_id;
    use dc_core::registry::create;
    use pretty_assertions::assert_eq;

    fn boxes() -> Vec<Diagram> {
        vec![
            create(DiagramKind::Rectangle, 0.0, 0.0).unwrap(),
            create(DiagramKind::Rectangle, 300.0, 150.0).unwrap(),
        ]
    }

    fn east(d: &Diagram) -> NodeId {
        d.connect_points()[3].id
    }

    fn west(d: &Diagram) -> NodeId {
        d.connect_points()[2].id
    }

    fn line_of(points: &[(f64, f64)]) -> Diagram {
        let mut line = create(DiagramKind::ConnectLine, 0.0, 0.0).unwrap();
        line.items = Some(
            points
                .iter()
                .map(|(x, y)| Diagram::path_point(NodeId::fresh(), *x, *y))
                .collect(),
        );
        fit_to_vertices(&line)
    }

    #[test]
    fn created_line_pins_endpoint_ids() {
        let items = boxes();
        let line = create_connect_line(&items, east(&items[0]), west(&items[1]), &EngineConfig::default()).unwrap();
        let v = line.children();
        assert_eq!(v.first().unwrap().id, east(&items[0]));
        assert_eq!(v.last().unwrap().id, west(&items[1]));
        assert!(is_orthogonal(&line.vertices()));
        let ends = line.line.as_ref().unwrap();
        assert_eq!(ends.start_owner_id, items[0].id);
        assert_eq!(ends.end_owner_id, items[1].id);
        assert!(ends.auto_routing);
    }

    #[test]
    fn same_owner_is_refused() {
        let items = boxes();
        let a = &items[0];
        assert!(create_connect_line(&items, east(a), west(a), &EngineConfig::default()).is_none());
    }

    #[test]
    fn preview_bends_toward_cursor() {
        let items = boxes();
        let a = &items[0];
        let cp = &a.connect_points()[3];
        let path = preview_path(a, cp, Point::new(200.0, 80.0), 20.0);
        assert_eq!(
            path,
            vec![
                Point::new(50.0, 0.0),
                Point::new(70.0, 0.0),
                Point::new(70.0, 80.0),
                Point::new(200.0, 80.0),
            ]
        );
    }

    #[test]
    fn preview_detours_around_owner() {
        let items = boxes();
        let a = &items[0];
        let cp = &a.connect_points()[3];
        // Cursor behind the owner, level with it.
        let path = preview_path(a, cp, Point::new(-200.0, 10.0), 20.0);
        assert!(is_orthogonal(&path));
        let owner = a.bounds();
        for w in path.windows(2).skip(1) {
            assert!(
                !dc_core::geometry::segment_intersects_bounds(w[0], w[1], &owner),
                "{w:?} cuts through the owner"
            );
        }
    }

    #[test]
    fn manual_line_reattaches_with_square_corner() {
        let mut items = boxes();
        let mut line = create_connect_line(&items, east(&items[0]), west(&items[1]), &EngineConfig::default()).unwrap();
        line.line.as_mut().unwrap().auto_routing = false;
        items.push(line.clone());

        // Move B down by 40.
        let b = registry::with_updated_connect_points(&{
            let mut b = items[1].clone();
            b.set_shape(&b.shape().unwrap().translated(0.0, 40.0));
            b
        });
        items[1] = b;
        let index = DiagramIndex::build(&items);
        let out = reattach(&items, &index, &line).unwrap();
        let v = out.vertices();
        assert_eq!(*v.last().unwrap(), Point::new(250.0, 190.0));
        assert!(is_orthogonal(&v), "{v:?}");
        assert_eq!(out.children()[1].id, line.children()[1].id);
    }

    #[test]
    fn refresh_skips_untouched_lines() {
        let mut items = boxes();
        let line = create_connect_line(&items, east(&items[0]), west(&items[1]), &EngineConfig::default()).unwrap();
        items.push(line.clone());
        let touched: HashSet<NodeId> = [NodeId::fresh()].into_iter().collect();
        let (tree, changed) = refresh_connect_lines(&items, &items, &touched, &EngineConfig::default());
        assert!(changed.is_empty());
        assert_eq!(get_by_id(&tree, line.id), Some(&line));
    }

    #[test]
    fn move_vertex_keeps_right_angles() {
        let line = line_of(&[(0.0, 0.0), (50.0, 0.0), (50.0, 100.0), (100.0, 100.0)]);
        let out = move_vertex(&line, 1, Point::new(70.0, 20.0));
        // Neighbor 0 is an endpoint on a horizontal segment: y stays 0.
        assert_eq!(
            out.vertices(),
            vec![
                Point::new(0.0, 0.0),
                Point::new(70.0, 0.0),
                Point::new(70.0, 100.0),
                Point::new(100.0, 100.0),
            ]
        );
        assert!(!out.line.as_ref().unwrap().auto_routing);
    }

    #[test]
    fn endpoints_are_pinned() {
        let line = line_of(&[(0.0, 0.0), (100.0, 0.0)]);
        assert_eq!(move_vertex(&line, 0, Point::new(5.0, 5.0)), line);
    }

    #[test]
    fn inserted_vertex_gets_fresh_id_on_finalize() {
        let line = line_of(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)]);
        let inserted = insert_vertex(&line, 0).unwrap();
        assert_eq!(inserted.children()[1].id, NodeId::new_vertex());
        assert_eq!(inserted.children()[1].position(), Point::new(50.0, 0.0));

        let moved = move_new_vertex(&inserted, Point::new(50.0, -30.0));
        let done = finalize_new_vertex(&moved);
        let v = &done.children()[1];
        assert!(!v.id.is_reserved());
        assert_eq!(v.position(), Point::new(50.0, -30.0));
        assert_eq!(done.children().len(), 4);
    }

    #[test]
    fn downstream_follows_line_direction() {
        let mut items = boxes();
        let line = create_connect_line(&items, east(&items[0]), west(&items[1]), &EngineConfig::default()).unwrap();
        items.push(line);
        assert_eq!(downstream_of(&items, items[0].id), vec![items[1].id]);
        assert!(downstream_of(&items, items[1].id).is_empty());
    }

    #[test]
    fn route_end_faces_outward() {
        let owner = create(DiagramKind::Ellipse, 0.0, 0.0).unwrap();
        let end: RouteEnd = route_end(&owner, &owner.connect_points()[0]);
        assert_eq!(end.direction, Direction::Up);
        assert_eq!(end.owner, Shape::new(0.0, 0.0, 100.0, 100.0).aabb());
    }
}
