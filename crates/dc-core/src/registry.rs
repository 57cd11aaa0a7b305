//! Kind → behavior lookup table.
//!
//! Per-kind behavior (factory, connect-point calculator, exporter) is a
//! table lookup on `DiagramKind`, never trait-object dispatch.

use crate::export;
use crate::geometry::{AnchorName, Point, ellipse_anchors, rectangle_anchors};
use crate::id::NodeId;
use crate::model::*;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Which capability mix-ins a kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub transformative: bool,
    pub selectable: bool,
    pub itemable: bool,
    pub connectable: bool,
    pub strokable: bool,
    pub fillable: bool,
    pub textable: bool,
    pub executable: bool,
}

pub type Factory = fn(f64, f64) -> Diagram;
pub type ConnectPointCalculator = fn(&Diagram) -> ConnectPoints;
pub type Exporter = fn(&Diagram) -> String;

pub struct RegistryEntry {
    pub capabilities: Capabilities,
    pub factory: Factory,
    pub calc_connect_points: Option<ConnectPointCalculator>,
    pub export: Option<Exporter>,
}

static REGISTRY: LazyLock<HashMap<DiagramKind, RegistryEntry>> = LazyLock::new(build_registry);

/// Look up the behavior table entry for a kind.
pub fn lookup(kind: DiagramKind) -> Option<&'static RegistryEntry> {
    let entry = REGISTRY.get(&kind);
    if entry.is_none() {
        log::warn!("no registry entry for {kind:?}");
    }
    entry
}

/// Capabilities of a kind (all-false for an unregistered kind).
pub fn capabilities(kind: DiagramKind) -> Capabilities {
    REGISTRY
        .get(&kind)
        .map(|e| e.capabilities)
        .unwrap_or_default()
}

/// Create a node of `kind` centered at (x, y) with a fresh id.
pub fn create(kind: DiagramKind, x: f64, y: f64) -> Option<Diagram> {
    lookup(kind).map(|e| (e.factory)(x, y))
}

/// Recompute the connect points of a node from its current geometry.
/// Existing point ids are preserved per anchor name.
pub fn calc_connect_points(node: &Diagram) -> Option<ConnectPoints> {
    let calc = lookup(node.kind)?.calc_connect_points?;
    Some(calc(node))
}

/// Return `node` with its connect points refreshed (no-op when not connectable).
pub fn with_updated_connect_points(node: &Diagram) -> Diagram {
    let mut next = node.clone();
    if next.connectable.is_some()
        && let Some(points) = calc_connect_points(node)
    {
        next.connectable = Some(Connectable {
            connect_points: points,
        });
    }
    next
}

// ─── Connect point calculators ───────────────────────────────────────────

fn anchors_to_points(node: &Diagram, anchors: [(AnchorName, Point); 8]) -> ConnectPoints {
    anchors
        .into_iter()
        .map(|(name, p)| {
            let id = node
                .connect_points()
                .iter()
                .find(|cp| cp.name == name)
                .map(|cp| cp.id)
                .unwrap_or_else(NodeId::fresh);
            ConnectPoint {
                id,
                name,
                x: p.x,
                y: p.y,
                owner_id: node.id,
            }
        })
        .collect()
}

fn rectangle_connect_points(node: &Diagram) -> ConnectPoints {
    match node.shape() {
        Some(shape) => anchors_to_points(node, rectangle_anchors(&shape)),
        None => ConnectPoints::new(),
    }
}

fn ellipse_connect_points(node: &Diagram) -> ConnectPoints {
    match node.shape() {
        Some(shape) => anchors_to_points(node, ellipse_anchors(&shape)),
        None => ConnectPoints::new(),
    }
}

// ─── Factories ───────────────────────────────────────────────────────────

fn boxed(kind: DiagramKind, x: f64, y: f64, width: f64, height: f64) -> Diagram {
    let mut d = Diagram::new(NodeId::fresh(), kind, x, y);
    d.transform = Some(Transform::new(width, height));
    d
}

fn connectable(mut d: Diagram, calc: ConnectPointCalculator) -> Diagram {
    d.connectable = Some(Connectable {
        connect_points: calc(&d),
    });
    d
}

fn create_rectangle(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Rectangle, x, y, 100.0, 100.0);
    d.stroke = Some(Stroke::default());
    d.fill = Some(Fill::default());
    d.text = Some(TextBlock::default());
    connectable(d, rectangle_connect_points)
}

fn create_ellipse(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Ellipse, x, y, 100.0, 100.0);
    d.stroke = Some(Stroke::default());
    d.fill = Some(Fill::default());
    d.text = Some(TextBlock::default());
    connectable(d, ellipse_connect_points)
}

fn create_image(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Image, x, y, 100.0, 100.0);
    d.media = Some(Media::Image {
        base64: String::new(),
    });
    connectable(d, rectangle_connect_points)
}

fn create_svg(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Svg, x, y, 100.0, 100.0);
    d.media = Some(Media::Svg {
        text: String::new(),
    });
    connectable(d, rectangle_connect_points)
}

fn create_path(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Path, x, y, 100.0, 0.0);
    d.stroke = Some(Stroke::default());
    d.items = Some(vec![
        Diagram::path_point(NodeId::fresh(), x - 50.0, y),
        Diagram::path_point(NodeId::fresh(), x + 50.0, y),
    ]);
    d
}

fn create_path_point(x: f64, y: f64) -> Diagram {
    Diagram::path_point(NodeId::fresh(), x, y)
}

fn create_group(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::Group, x, y, 0.0, 0.0);
    d.items = Some(Vec::new());
    d
}

fn create_connect_line(x: f64, y: f64) -> Diagram {
    let mut d = boxed(DiagramKind::ConnectLine, x, y, 0.0, 0.0);
    d.stroke = Some(Stroke::default());
    d.items = Some(Vec::new());
    d.line = Some(LineEnds {
        start_owner_id: d.id,
        end_owner_id: d.id,
        auto_routing: true,
        start_arrow_head: ArrowHead::None,
        end_arrow_head: ArrowHead::Triangle,
    });
    d
}

fn workflow_node(kind: DiagramKind, x: f64, y: f64, label: &str) -> Diagram {
    let mut d = boxed(kind, x, y, 350.0, 200.0);
    d.stroke = Some(Stroke::default());
    d.fill = Some(Fill {
        color: "#ffffff".into(),
    });
    d.text = Some(TextBlock {
        text: label.into(),
        ..Default::default()
    });
    d.executable = Some(Executable::default());
    connectable(d, rectangle_connect_points)
}

fn create_llm_node(x: f64, y: f64) -> Diagram {
    workflow_node(DiagramKind::LlmNode, x, y, "LLM")
}

fn create_text_area_node(x: f64, y: f64) -> Diagram {
    workflow_node(DiagramKind::TextAreaNode, x, y, "")
}

fn create_image_gen_node(x: f64, y: f64) -> Diagram {
    workflow_node(DiagramKind::ImageGenNode, x, y, "Image Generator")
}

fn create_web_search_node(x: f64, y: f64) -> Diagram {
    workflow_node(DiagramKind::WebSearchNode, x, y, "Web Search")
}

fn create_if_node(x: f64, y: f64) -> Diagram {
    workflow_node(DiagramKind::IfNode, x, y, "If")
}

fn create_hub_node(x: f64, y: f64) -> Diagram {
    let mut d = workflow_node(DiagramKind::HubNode, x, y, "");
    if let Some(t) = d.transform.as_mut() {
        t.width = 80.0;
        t.height = 80.0;
    }
    connectable(d, ellipse_connect_points)
}

// ─── Table ───────────────────────────────────────────────────────────────

const SHAPE: Capabilities = Capabilities {
    transformative: true,
    selectable: true,
    itemable: false,
    connectable: true,
    strokable: true,
    fillable: true,
    textable: true,
    executable: false,
};

const WORKFLOW: Capabilities = Capabilities {
    executable: true,
    ..SHAPE
};

const MEDIA: Capabilities = Capabilities {
    transformative: true,
    selectable: true,
    connectable: true,
    ..Capabilities::NONE
};

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        transformative: false,
        selectable: false,
        itemable: false,
        connectable: false,
        strokable: false,
        fillable: false,
        textable: false,
        executable: false,
    };
}

fn build_registry() -> HashMap<DiagramKind, RegistryEntry> {
    use DiagramKind as K;

    let rows: [(DiagramKind, Capabilities, Factory, Option<ConnectPointCalculator>, Option<Exporter>); 14] = [
        (K::Rectangle, SHAPE, create_rectangle, Some(rectangle_connect_points), Some(export::export_rectangle)),
        (K::Ellipse, SHAPE, create_ellipse, Some(ellipse_connect_points), Some(export::export_ellipse)),
        (K::Image, MEDIA, create_image, Some(rectangle_connect_points), Some(export::export_image)),
        (K::Svg, MEDIA, create_svg, Some(rectangle_connect_points), Some(export::export_svg_node)),
        (
            K::Path,
            Capabilities {
                transformative: true,
                selectable: true,
                itemable: true,
                strokable: true,
                ..Capabilities::NONE
            },
            create_path,
            None,
            Some(export::export_polyline),
        ),
        (K::PathPoint, Capabilities::NONE, create_path_point, None, None),
        (
            K::Group,
            Capabilities {
                transformative: true,
                selectable: true,
                itemable: true,
                ..Capabilities::NONE
            },
            create_group,
            None,
            Some(export::export_group),
        ),
        (
            K::ConnectLine,
            Capabilities {
                transformative: true,
                selectable: true,
                itemable: true,
                strokable: true,
                ..Capabilities::NONE
            },
            create_connect_line,
            None,
            Some(export::export_polyline),
        ),
        (K::LlmNode, WORKFLOW, create_llm_node, Some(rectangle_connect_points), None),
        (K::TextAreaNode, WORKFLOW, create_text_area_node, Some(rectangle_connect_points), None),
        (K::ImageGenNode, WORKFLOW, create_image_gen_node, Some(rectangle_connect_points), None),
        (K::WebSearchNode, WORKFLOW, create_web_search_node, Some(rectangle_connect_points), None),
        (K::IfNode, WORKFLOW, create_if_node, Some(rectangle_connect_points), None),
        (K::HubNode, WORKFLOW, create_hub_node, Some(ellipse_connect_points), None),
    ];

    rows.into_iter()
        .map(|(kind, capabilities, factory, calc_connect_points, export)| {
            (
                kind,
                RegistryEntry {
                    capabilities,
                    factory,
                    calc_connect_points,
                    export,
                },
            )
        })
        .collect()
}
