//! Geometry math shared by every engine.
//!
//! All functions are pure. Shapes are center-based: `x`/`y` is the center of
//! the box, `rotation` is in degrees (clockwise in screen space, since +y
//! points down), and `scale_x`/`scale_y` are ±1 flips.

use serde::{Deserialize, Serialize};

/// Tolerance used for "same coordinate" tests on routed paths.
pub const EPSILON: f64 = 1e-6;

// ─── Points ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn approx_eq(self, other: Point) -> bool {
        (self.x - other.x).abs() < EPSILON && (self.y - other.y).abs() < EPSILON
    }
}

// ─── Shapes & bounds ─────────────────────────────────────────────────────

/// The oriented box of a transformative node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl Shape {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn approx_eq(&self, other: &Shape) -> bool {
        [
            (self.x, other.x),
            (self.y, other.y),
            (self.width, other.width),
            (self.height, other.height),
            (self.rotation, other.rotation),
            (self.scale_x, other.scale_x),
            (self.scale_y, other.scale_y),
        ]
        .iter()
        .all(|(a, b)| (a - b).abs() < EPSILON)
    }

    /// Rotated corners, in order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let c = self.center();
        let r = degrees_to_radians(self.rotation);
        [
            rotate_point(Point::new(c.x - hw, c.y - hh), c, r),
            rotate_point(Point::new(c.x + hw, c.y - hh), c, r),
            rotate_point(Point::new(c.x + hw, c.y + hh), c, r),
            rotate_point(Point::new(c.x - hw, c.y + hh), c, r),
        ]
    }

    /// Axis-aligned box enclosing the rotated shape.
    pub fn aabb(&self) -> Bounds {
        Bounds::enclosing(&self.corners()).unwrap_or(Bounds::new(self.x, self.y, 0.0, 0.0))
    }

    /// Whether the point lies inside the rotated box (edges inclusive).
    pub fn contains_point(&self, p: Point) -> bool {
        let local = rotate_point(p, self.center(), -degrees_to_radians(self.rotation));
        (local.x - self.x).abs() <= self.width / 2.0 && (local.y - self.y).abs() <= self.height / 2.0
    }
}

/// Center-based axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            x: (left + right) / 2.0,
            y: (top + bottom) / 2.0,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Normalized box spanned by two arbitrary corners (marquee drag).
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::from_edges(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    /// Tight box around a set of points. `None` for an empty set.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut l, mut t, mut r, mut b) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            l = l.min(p.x);
            t = t.min(p.y);
            r = r.max(p.x);
            b = b.max(p.y);
        }
        Some(Self::from_edges(l, t, r, b))
    }

    pub fn left(&self) -> f64 {
        self.x - self.width / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn top(&self) -> f64 {
        self.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.x,
            self.y,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    /// Strict interior test (points on an edge are outside).
    pub fn contains_point_strictly(&self, p: Point) -> bool {
        p.x > self.left() + EPSILON
            && p.x < self.right() - EPSILON
            && p.y > self.top() + EPSILON
            && p.y < self.bottom() - EPSILON
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }

    pub fn union(&self, other: &Bounds) -> Self {
        Self::from_edges(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }
}

// ─── Angles & rotation ───────────────────────────────────────────────────

pub fn degrees_to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

pub fn radians_to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Normalize an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees % 360.0;
    if d < 0.0 { d + 360.0 } else { d }
}

/// Rotate `p` around `center` by `radians`.
pub fn rotate_point(p: Point, center: Point, radians: f64) -> Point {
    let (sin, cos) = radians.sin_cos();
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    Point::new(
        center.x + dx * cos - dy * sin,
        center.y + dx * sin + dy * cos,
    )
}

/// Box of `points` measured in a frame rotated by `rotation` degrees and
/// mirrored by the signs of `scale_x`/`scale_y`.
///
/// The returned `width`/`height` are extents in that frame; `x`/`y` is the
/// box center mapped back to canvas coordinates.
pub fn bounding_box_of_points(
    points: &[Point],
    rotation: f64,
    scale_x: f64,
    scale_y: f64,
) -> Option<Bounds> {
    let r = degrees_to_radians(rotation);
    let origin = Point::default();
    let sx = if scale_x < 0.0 { -1.0 } else { 1.0 };
    let sy = if scale_y < 0.0 { -1.0 } else { 1.0 };

    let local: Vec<Point> = points
        .iter()
        .map(|p| {
            let q = rotate_point(*p, origin, -r);
            Point::new(q.x * sx, q.y * sy)
        })
        .collect();
    let b = Bounds::enclosing(&local)?;

    let center = rotate_point(Point::new(b.x * sx, b.y * sy), origin, r);
    Some(Bounds::new(center.x, center.y, b.width, b.height))
}

// ─── Anchors ─────────────────────────────────────────────────────────────

/// The eight named boundary anchors of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorName {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl AnchorName {
    pub const ALL: [AnchorName; 8] = [
        AnchorName::Top,
        AnchorName::Bottom,
        AnchorName::Left,
        AnchorName::Right,
        AnchorName::TopLeft,
        AnchorName::TopRight,
        AnchorName::BottomLeft,
        AnchorName::BottomRight,
    ];

    /// Unit offset of the anchor in the shape's unrotated frame.
    fn unit(self) -> (f64, f64) {
        match self {
            AnchorName::Top => (0.0, -1.0),
            AnchorName::Bottom => (0.0, 1.0),
            AnchorName::Left => (-1.0, 0.0),
            AnchorName::Right => (1.0, 0.0),
            AnchorName::TopLeft => (-1.0, -1.0),
            AnchorName::TopRight => (1.0, -1.0),
            AnchorName::BottomLeft => (-1.0, 1.0),
            AnchorName::BottomRight => (1.0, 1.0),
        }
    }
}

/// Corners and edge midpoints of the rotated box.
pub fn rectangle_anchors(shape: &Shape) -> [(AnchorName, Point); 8] {
    let c = shape.center();
    let r = degrees_to_radians(shape.rotation);
    AnchorName::ALL.map(|name| {
        let (ux, uy) = name.unit();
        let p = Point::new(
            c.x + ux * shape.width / 2.0,
            c.y + uy * shape.height / 2.0,
        );
        (name, rotate_point(p, c, r))
    })
}

/// Eight points on the ellipse perimeter at multiples of 45°.
pub fn ellipse_anchors(shape: &Shape) -> [(AnchorName, Point); 8] {
    let c = shape.center();
    let r = degrees_to_radians(shape.rotation);
    let rx = shape.width / 2.0;
    let ry = shape.height / 2.0;
    let diag = std::f64::consts::FRAC_1_SQRT_2;
    AnchorName::ALL.map(|name| {
        let (ux, uy) = name.unit();
        let k = if ux != 0.0 && uy != 0.0 { diag } else { 1.0 };
        let p = Point::new(c.x + ux * k * rx, c.y + uy * k * ry);
        (name, rotate_point(p, c, r))
    })
}

// ─── Directions ──────────────────────────────────────────────────────────

/// Axis-aligned direction used by the connector router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn vector(self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// The axis direction closest to the vector `from → to`.
/// Ties prefer the horizontal axis.
pub fn nearest_axis_direction(from: Point, to: Point) -> Direction {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if dy >= 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

// ─── Intersections ───────────────────────────────────────────────────────

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Cross-product segment intersection test, touching endpoints included.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);

    if ((d1 > EPSILON && d2 < -EPSILON) || (d1 < -EPSILON && d2 > EPSILON))
        && ((d3 > EPSILON && d4 < -EPSILON) || (d3 < -EPSILON && d4 > EPSILON))
    {
        return true;
    }

    (d1.abs() <= EPSILON && on_segment(b1, b2, a1))
        || (d2.abs() <= EPSILON && on_segment(b1, b2, a2))
        || (d3.abs() <= EPSILON && on_segment(a1, a2, b1))
        || (d4.abs() <= EPSILON && on_segment(a1, a2, b2))
}

/// Whether segment `a → b` passes through the open interior of `bounds`.
/// Running along an edge does not count.
pub fn segment_intersects_bounds(a: Point, b: Point, bounds: &Bounds) -> bool {
    // Liang–Barsky clip against the closed box, then probe the clipped middle.
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let checks = [
        (-dx, a.x - bounds.left()),
        (dx, bounds.right() - a.x),
        (-dy, a.y - bounds.top()),
        (dy, bounds.bottom() - a.y),
    ];
    for (p, q) in checks {
        if p.abs() < EPSILON {
            if q < 0.0 {
                return false;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    if t0 > t1 {
        return false;
    }
    let tm = (t0 + t1) / 2.0;
    bounds.contains_point_strictly(Point::new(a.x + dx * tm, a.y + dy * tm))
}

// ─── Viewport ────────────────────────────────────────────────────────────

/// The visible window onto the infinite canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            width: 800.0,
            height: 600.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    /// Screen (client) coordinates → canvas coordinates.
    pub fn client_to_canvas(&self, p: Point) -> Point {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Point::new(self.min_x + p.x / zoom, self.min_y + p.y / zoom)
    }

    /// Canvas coordinates → screen (client) coordinates.
    pub fn canvas_to_client(&self, p: Point) -> Point {
        Point::new((p.x - self.min_x) * self.zoom, (p.y - self.min_y) * self.zoom)
    }
}
