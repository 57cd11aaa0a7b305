//! Orthogonal connector routing.
//!
//! The search space is a sparse grid built from the interesting x and y
//! coordinates around both owners (margin-box edges, stub points, the gaps
//! between the boxes). Each grid point appears twice in the graph, once
//! per travel axis, so a turn is an explicit edge that costs
//! `bend_penalty`. A* over that graph yields the shortest route with the
//! fewest bends that never enters either owner's margin box.

use dc_core::geometry::{Bounds, Direction, EPSILON, Point, segment_intersects_bounds};
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use smallvec::SmallVec;

/// One end of a connector: the anchor, the way it faces, and the box of
/// the shape it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEnd {
    pub point: Point,
    pub direction: Direction,
    pub owner: Bounds,
}

impl RouteEnd {
    pub fn margin_box(&self, margin: f64) -> Bounds {
        self.owner.expand(margin)
    }

    /// Where the connector crosses the margin box on its way out.
    pub fn stub(&self, margin: f64) -> Point {
        let b = self.margin_box(margin);
        match self.direction {
            Direction::Right => Point::new(b.right(), self.point.y),
            Direction::Left => Point::new(b.left(), self.point.y),
            Direction::Up => Point::new(self.point.x, b.top()),
            Direction::Down => Point::new(self.point.x, b.bottom()),
        }
    }
}

type Coords = SmallVec<[f64; 12]>;

fn sorted_unique(mut values: Coords) -> Coords {
    values.sort_by(f64::total_cmp);
    values.dedup_by(|a, b| (*a - *b).abs() < EPSILON);
    values
}

fn position_of(values: &[f64], v: f64) -> Option<usize> {
    values.iter().position(|x| (x - v).abs() < EPSILON)
}

/// Middle of the gap between two intervals, if they do not overlap.
fn gap_middle(a: (f64, f64), b: (f64, f64)) -> Option<f64> {
    if a.1 < b.0 {
        Some((a.1 + b.0) / 2.0)
    } else if b.1 < a.0 {
        Some((b.1 + a.0) / 2.0)
    } else {
        None
    }
}

/// Route from `start` to `end`. The result begins at `start.point`, ends at
/// `end.point`, and every segment is axis-aligned.
pub fn route_orthogonal(start: &RouteEnd, end: &RouteEnd, margin: f64, bend_penalty: f64) -> Vec<Point> {
    let ms = start.margin_box(margin);
    let me = end.margin_box(margin);
    let s = start.stub(margin);
    let e = end.stub(margin);

    let mut xs: Coords = SmallVec::from_slice(&[
        s.x,
        e.x,
        ms.left(),
        ms.right(),
        me.left(),
        me.right(),
        (s.x + e.x) / 2.0,
    ]);
    xs.extend(gap_middle((ms.left(), ms.right()), (me.left(), me.right())));
    let mut ys: Coords = SmallVec::from_slice(&[
        s.y,
        e.y,
        ms.top(),
        ms.bottom(),
        me.top(),
        me.bottom(),
        (s.y + e.y) / 2.0,
    ]);
    ys.extend(gap_middle((ms.top(), ms.bottom()), (me.top(), me.bottom())));
    let xs = sorted_unique(xs);
    let ys = sorted_unique(ys);

    let blocked = |p: Point| {
        !(p.approx_eq(s) || p.approx_eq(e))
            && (ms.contains_point_strictly(p) || me.contains_point_strictly(p))
    };
    let crosses = |a: Point, b: Point| {
        segment_intersects_bounds(a, b, &ms) || segment_intersects_bounds(a, b, &me)
    };

    // Node layout: two nodes per grid point, [horizontal, vertical].
    let mut graph = UnGraph::<Point, f64>::with_capacity(xs.len() * ys.len() * 2, 0);
    let mut nodes: Vec<[NodeIndex; 2]> = Vec::with_capacity(xs.len() * ys.len());
    for &y in &ys {
        for &x in &xs {
            let point = Point::new(x, y);
            let h = graph.add_node(point);
            let v = graph.add_node(point);
            if !blocked(point) {
                graph.add_edge(h, v, bend_penalty);
            }
            nodes.push([h, v]);
        }
    }
    let at = |ix: usize, iy: usize| iy * xs.len() + ix;

    for iy in 0..ys.len() {
        for ix in 0..xs.len() {
            let a = Point::new(xs[ix], ys[iy]);
            if blocked(a) {
                continue;
            }
            if ix + 1 < xs.len() {
                let b = Point::new(xs[ix + 1], ys[iy]);
                if !blocked(b) && !crosses(a, b) {
                    graph.add_edge(nodes[at(ix, iy)][0], nodes[at(ix + 1, iy)][0], b.x - a.x);
                }
            }
            if iy + 1 < ys.len() {
                let b = Point::new(xs[ix], ys[iy + 1]);
                if !blocked(b) && !crosses(a, b) {
                    graph.add_edge(nodes[at(ix, iy)][1], nodes[at(ix, iy + 1)][1], b.y - a.y);
                }
            }
        }
    }

    let axis = |d: Direction| if d.is_horizontal() { 0 } else { 1 };
    let endpoints = (
        position_of(&xs, s.x).zip(position_of(&ys, s.y)),
        position_of(&xs, e.x).zip(position_of(&ys, e.y)),
    );
    let found = match endpoints {
        (Some((sx, sy)), Some((ex, ey))) => {
            let from = nodes[at(sx, sy)][axis(start.direction)];
            let goal = nodes[at(ex, ey)][axis(end.direction)];
            astar(
                &graph,
                from,
                |n| n == goal,
                |edge| *edge.weight(),
                |n| {
                    let p = graph[n];
                    (p.x - e.x).abs() + (p.y - e.y).abs()
                },
            )
        }
        _ => None,
    };

    let mut points = vec![start.point];
    match found {
        Some((cost, path)) => {
            log::trace!("route found: {} nodes, cost {cost:.1}", path.len());
            points.extend(path.into_iter().map(|n| graph[n]));
        }
        None => {
            log::debug!("no clear route between {:?} and {:?}, using elbow", start.point, end.point);
            points.extend(elbow(s, e, start.direction));
        }
    }
    points.push(end.point);
    simplify_orthogonal(points)
}

/// Three-segment fallback between two stubs.
fn elbow(s: Point, e: Point, direction: Direction) -> [Point; 4] {
    if direction.is_horizontal() {
        let mid = (s.x + e.x) / 2.0;
        [s, Point::new(mid, s.y), Point::new(mid, e.y), e]
    } else {
        let mid = (s.y + e.y) / 2.0;
        [s, Point::new(s.x, mid), Point::new(e.x, mid), e]
    }
}

/// Drop repeated points and the middle of any three collinear
/// axis-aligned points.
pub fn simplify_orthogonal(points: Vec<Point>) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_some_and(|last| last.approx_eq(p)) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let same_x = (a.x - b.x).abs() < EPSILON && (b.x - p.x).abs() < EPSILON;
            let same_y = (a.y - b.y).abs() < EPSILON && (b.y - p.y).abs() < EPSILON;
            if same_x || same_y {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

/// Whether every segment of the polyline is horizontal or vertical.
pub fn is_orthogonal(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|w| (w[0].x - w[1].x).abs() < EPSILON || (w[0].y - w[1].y).abs() < EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn end(point: Point, direction: Direction, center: Point) -> RouteEnd {
        RouteEnd {
            point,
            direction,
            owner: Bounds::new(center.x, center.y, 100.0, 100.0),
        }
    }

    fn middle_segments_avoid(points: &[Point], boxes: &[Bounds]) {
        // The first and last segments leave/enter through the margin on purpose.
        for w in points[1..points.len() - 1].windows(2) {
            for b in boxes {
                assert!(!segment_intersects_bounds(w[0], w[1], b), "{w:?} enters {b:?}");
            }
        }
    }

    #[test]
    fn facing_anchors_route_straight() {
        let a = end(Point::new(50.0, 0.0), Direction::Right, Point::new(0.0, 0.0));
        let b = end(Point::new(250.0, 0.0), Direction::Left, Point::new(300.0, 0.0));
        let route = route_orthogonal(&a, &b, 20.0, 40.0);
        assert_eq!(route, vec![Point::new(50.0, 0.0), Point::new(250.0, 0.0)]);
    }

    #[test]
    fn offset_anchors_take_two_bends() {
        let a = end(Point::new(50.0, 0.0), Direction::Right, Point::new(0.0, 0.0));
        let b = end(Point::new(250.0, 150.0), Direction::Left, Point::new(300.0, 150.0));
        let route = route_orthogonal(&a, &b, 20.0, 40.0);
        assert!(is_orthogonal(&route));
        assert_eq!(route.len(), 4, "{route:?}");
        assert_eq!(route[0], a.point);
        assert_eq!(route[3], b.point);
    }

    #[test]
    fn anchor_facing_away_goes_around_its_owner() {
        // B sits to the left of A while A's anchor points right.
        let a = end(Point::new(50.0, 0.0), Direction::Right, Point::new(0.0, 0.0));
        let b = end(Point::new(-250.0, 0.0), Direction::Right, Point::new(-300.0, 0.0));
        let route = route_orthogonal(&a, &b, 20.0, 40.0);
        assert!(is_orthogonal(&route));
        middle_segments_avoid(&route, &[a.margin_box(20.0), b.margin_box(20.0)]);
        // Leaves rightward before turning.
        assert!(route[1].x > 50.0);
    }

    #[test]
    fn simplify_removes_collinear_and_repeats() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(20.0, 10.0),
        ];
        assert_eq!(
            simplify_orthogonal(pts),
            vec![Point::new(0.0, 0.0), Point::new(20.0, 0.0), Point::new(20.0, 10.0)]
        );
    }

    #[test]
    fn elbow_is_orthogonal() {
        let pts = elbow(Point::new(0.0, 0.0), Point::new(100.0, 50.0), Direction::Right);
        assert!(is_orthogonal(&pts));
    }
}
