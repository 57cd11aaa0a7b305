//! Core diagram-tree data model.
//!
//! The canvas is an exclusively-owned recursive tree of `Diagram` nodes.
//! Every node has `{id, type, x, y}` (x/y is the center); everything else is
//! an optional capability mix-in whose presence is decided by the node's
//! kind (see `registry`). ConnectLines reference their owners by id only,
//! so the tree never contains cycles.
//!
//! Trees are treated as values: every edit produces a new `Vec<Diagram>`
//! through structural copy, never an in-place patch of a shared tree.

use crate::geometry::{AnchorName, Bounds, Point, Shape};
use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

// ─── Kinds ───────────────────────────────────────────────────────────────

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagramKind {
    Rectangle,
    Ellipse,
    Image,
    Svg,
    Path,
    PathPoint,
    Group,
    ConnectLine,
    #[serde(rename = "LLMNode")]
    LlmNode,
    TextAreaNode,
    ImageGenNode,
    WebSearchNode,
    IfNode,
    HubNode,
}

impl DiagramKind {
    pub const ALL: [DiagramKind; 14] = [
        DiagramKind::Rectangle,
        DiagramKind::Ellipse,
        DiagramKind::Image,
        DiagramKind::Svg,
        DiagramKind::Path,
        DiagramKind::PathPoint,
        DiagramKind::Group,
        DiagramKind::ConnectLine,
        DiagramKind::LlmNode,
        DiagramKind::TextAreaNode,
        DiagramKind::ImageGenNode,
        DiagramKind::WebSearchNode,
        DiagramKind::IfNode,
        DiagramKind::HubNode,
    ];
}

// ─── Capabilities ────────────────────────────────────────────────────────

/// Transformative: the oriented box of the node (center is the node's x/y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub keep_proportion: bool,
}

impl Transform {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            keep_proportion: false,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A named anchor on a shape boundary that a ConnectLine can attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPoint {
    pub id: NodeId,
    pub name: AnchorName,
    pub x: f64,
    pub y: f64,
    pub owner_id: NodeId,
}

impl ConnectPoint {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

pub type ConnectPoints = SmallVec<[ConnectPoint; 8]>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectable {
    pub connect_points: ConnectPoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub color: String,
    pub width: f64,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            color: "#000000".into(),
            width: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub color: String,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            color: "transparent".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub text: String,
    pub font_color: String,
    pub font_size: f64,
    pub font_family: String,
    pub font_weight: u16,
    pub text_align: TextAlign,
    pub vertical_align: VerticalAlign,
}

impl Default for TextBlock {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_color: "#000000".into(),
            font_size: 16.0,
            font_family: "Roboto".into(),
            font_weight: 400,
            text_align: TextAlign::Center,
            vertical_align: VerticalAlign::Center,
        }
    }
}

/// Executable: metadata for execution propagation between workflow nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
    #[serde(skip)]
    pub is_executing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArrowHead {
    #[default]
    None,
    Triangle,
    Circle,
}

/// ConnectLine-only attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEnds {
    pub start_owner_id: NodeId,
    pub end_owner_id: NodeId,
    pub auto_routing: bool,
    pub start_arrow_head: ArrowHead,
    pub end_arrow_head: ArrowHead,
}

/// Embedded image/SVG payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "format")]
pub enum Media {
    Image { base64: String },
    Svg { text: String },
}

/// Ephemeral interaction flags. Never serialized; reset on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiState {
    pub is_selected: bool,
    pub is_ancestor_selected: bool,
    pub show_outline: bool,
    pub is_dragging: bool,
    pub is_transforming: bool,
    pub show_connect_points: bool,
}

// ─── Diagram node ────────────────────────────────────────────────────────

/// A single node of the diagram tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub id: NodeId,

    #[serde(rename = "type")]
    pub kind: DiagramKind,

    /// Center x in canvas coordinates.
    pub x: f64,

    /// Center y in canvas coordinates.
    pub y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,

    /// Owned children: group members, path vertices, connector vertices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Diagram>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectable: Option<Connectable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<Executable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<LineEnds>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,

    #[serde(skip)]
    pub ui: UiState,
}

impl Diagram {
    /// A bare node with no capabilities. Factories in `registry` attach them.
    pub fn new(id: NodeId, kind: DiagramKind, x: f64, y: f64) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            transform: None,
            items: None,
            connectable: None,
            stroke: None,
            fill: None,
            text: None,
            executable: None,
            line: None,
            media: None,
            ui: UiState::default(),
        }
    }

    /// A connector/path vertex.
    pub fn path_point(id: NodeId, x: f64, y: f64) -> Self {
        Self::new(id, DiagramKind::PathPoint, x, y)
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The node's oriented box, if it is transformative.
    pub fn shape(&self) -> Option<Shape> {
        self.transform.map(|t| Shape {
            x: self.x,
            y: self.y,
            width: t.width,
            height: t.height,
            rotation: t.rotation,
            scale_x: t.scale_x,
            scale_y: t.scale_y,
        })
    }

    /// Move the node to `shape`. Non-transformative nodes only take the center.
    pub fn set_shape(&mut self, shape: &Shape) {
        self.x = shape.x;
        self.y = shape.y;
        if let Some(t) = self.transform.as_mut() {
            t.width = shape.width;
            t.height = shape.height;
            t.rotation = shape.rotation;
            t.scale_x = shape.scale_x;
            t.scale_y = shape.scale_y;
        }
    }

    /// Children, or an empty slice for non-itemable nodes.
    pub fn children(&self) -> &[Diagram] {
        self.items.as_deref().unwrap_or(&[])
    }

    pub fn connect_points(&self) -> &[ConnectPoint] {
        self.connectable
            .as_ref()
            .map(|c| c.connect_points.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_selected(&self) -> bool {
        self.ui.is_selected
    }

    /// Vertex positions of a path or connector.
    pub fn vertices(&self) -> Vec<Point> {
        self.children().iter().map(Diagram::position).collect()
    }

    /// Whether the node's geometry is defined by its vertex children.
    pub fn is_polyline(&self) -> bool {
        matches!(self.kind, DiagramKind::Path | DiagramKind::ConnectLine)
    }

    /// Points whose hull is the visible extent of the node: vertices for
    /// paths and connectors, rotated corners for boxes, the center otherwise.
    pub fn outline_points(&self) -> Vec<Point> {
        if self.is_polyline() && !self.children().is_empty() {
            return self.vertices();
        }
        match self.shape() {
            Some(shape) => shape.corners().to_vec(),
            None => vec![self.position()],
        }
    }

    /// Axis-aligned canvas-space extent of the node.
    pub fn bounds(&self) -> Bounds {
        Bounds::enclosing(&self.outline_points()).unwrap_or(Bounds::new(self.x, self.y, 0.0, 0.0))
    }
}

// ─── Tree operations ─────────────────────────────────────────────────────

/// Depth-first search for a node by id.
pub fn get_by_id(items: &[Diagram], id: NodeId) -> Option<&Diagram> {
    for item in items {
        if item.id == id {
            return Some(item);
        }
        if let Some(found) = get_by_id(item.children(), id) {
            return Some(found);
        }
    }
    None
}

/// Apply `f` to every node and recurse into the children of its result.
/// Returns a new tree; the input is untouched.
pub fn map_recursive<F>(items: &[Diagram], f: &mut F) -> Vec<Diagram>
where
    F: FnMut(&Diagram) -> Diagram,
{
    items
        .iter()
        .map(|item| {
            let mut next = f(item);
            if let Some(children) = next.items.take() {
                next.items = Some(map_recursive(&children, f));
            }
            next
        })
        .collect()
}

/// Visit every node depth-first, parents before children.
pub fn walk<'a, F>(items: &'a [Diagram], f: &mut F)
where
    F: FnMut(&'a Diagram),
{
    for item in items {
        f(item);
        walk(item.children(), f);
    }
}

/// The direct parent of `id`, or `None` when it sits at the root (or is missing).
pub fn find_parent(items: &[Diagram], id: NodeId) -> Option<&Diagram> {
    for item in items {
        if item.children().iter().any(|c| c.id == id) {
            return Some(item);
        }
        if let Some(found) = find_parent(item.children(), id) {
            return Some(found);
        }
    }
    None
}

/// Ancestor ids of `id`, nearest first.
pub fn ancestors_of(items: &[Diagram], id: NodeId) -> Vec<NodeId> {
    fn search(items: &[Diagram], id: NodeId, path: &mut Vec<NodeId>) -> bool {
        for item in items {
            if item.id == id {
                return true;
            }
            path.push(item.id);
            if search(item.children(), id, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut path = Vec::new();
    if search(items, id, &mut path) {
        path.reverse();
        path
    } else {
        Vec::new()
    }
}

/// Remove every node whose id is in `ids`, together with its descendants.
pub fn remove_by_ids(items: &[Diagram], ids: &HashSet<NodeId>) -> Vec<Diagram> {
    items
        .iter()
        .filter(|item| !ids.contains(&item.id))
        .map(|item| {
            let mut next = item.clone();
            if let Some(children) = next.items.take() {
                next.items = Some(remove_by_ids(&children, ids));
            }
            next
        })
        .collect()
}

/// Replace nodes by id with the given versions (structural copy).
pub fn replace_by_ids(items: &[Diagram], replacements: &HashMap<NodeId, Diagram>) -> Vec<Diagram> {
    if replacements.is_empty() {
        return items.to_vec();
    }
    map_recursive(items, &mut |item| {
        replacements
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| item.clone())
    })
}

/// All node ids in the subtree(s), depth-first.
pub fn collect_ids(items: &[Diagram]) -> Vec<NodeId> {
    let mut out = Vec::new();
    walk(items, &mut |d| out.push(d.id));
    out
}

// ─── Index ───────────────────────────────────────────────────────────────

/// Auxiliary id → path index for O(1) lookups, rebuilt per tree version.
///
/// A path is the list of child positions from the root down to the node.
/// Connect point ids map to their owner node id.
#[derive(Debug, Clone, Default)]
pub struct DiagramIndex {
    paths: HashMap<NodeId, Vec<usize>>,
    point_owners: HashMap<NodeId, NodeId>,
}

impl DiagramIndex {
    pub fn build(items: &[Diagram]) -> Self {
        let mut index = Self::default();
        let mut path = Vec::new();
        index.visit(items, &mut path);
        index
    }

    fn visit(&mut self, items: &[Diagram], path: &mut Vec<usize>) {
        for (i, item) in items.iter().enumerate() {
            path.push(i);
            self.paths.insert(item.id, path.clone());
            for cp in item.connect_points() {
                self.point_owners.insert(cp.id, item.id);
            }
            self.visit(item.children(), path);
            path.pop();
        }
    }

    pub fn get<'a>(&self, items: &'a [Diagram], id: NodeId) -> Option<&'a Diagram> {
        let path = self.paths.get(&id)?;
        let (first, rest) = path.split_first()?;
        let mut node = items.get(*first)?;
        for &i in rest {
            node = node.children().get(i)?;
        }
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.paths.contains_key(&id)
    }

    /// Depth of the node (0 = root level).
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.paths.get(&id).map(|p| p.len() - 1)
    }

    /// The owner node of a connect point.
    pub fn owner_of_point(&self, point_id: NodeId) -> Option<NodeId> {
        self.point_owners.get(&point_id).copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
