//! SVG export for interchange.
//!
//! Each exportable kind has an exporter in the registry that emits one SVG
//! fragment; `export_svg` wraps the fragments of a whole tree in a sized
//! `<svg>` element. Visual fidelity with the interactive canvas is not a goal.

use crate::geometry::Bounds;
use crate::model::{Diagram, Media, walk};
use crate::registry;
use std::fmt::Write;

const EXPORT_PADDING: f64 = 16.0;

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `transform` attribute for rotation and mirroring around the node center.
fn transform_attr(node: &Diagram) -> String {
    let Some(t) = node.transform else {
        return String::new();
    };
    let mut parts = Vec::new();
    if t.rotation != 0.0 {
        parts.push(format!("rotate({} {} {})", t.rotation, node.x, node.y));
    }
    if t.scale_x != 1.0 || t.scale_y != 1.0 {
        parts.push(format!(
            "translate({} {}) scale({} {}) translate({} {})",
            node.x, node.y, t.scale_x, t.scale_y, -node.x, -node.y
        ));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" transform=\"{}\"", parts.join(" "))
    }
}

fn paint_attrs(node: &Diagram) -> String {
    let fill = node
        .fill
        .as_ref()
        .map(|f| escape_xml(&f.color))
        .unwrap_or_else(|| "none".into());
    let (stroke, width) = node
        .stroke
        .as_ref()
        .map(|s| (escape_xml(&s.color), s.width))
        .unwrap_or_else(|| ("none".into(), 0.0));
    format!(" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"{width}\"")
}

fn text_element(node: &Diagram) -> String {
    match &node.text {
        Some(t) if !t.text.is_empty() => format!(
            "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" fill=\"{}\"{}>{}</text>",
            node.x,
            node.y,
            escape_xml(&t.font_family),
            t.font_size,
            t.font_weight,
            escape_xml(&t.font_color),
            transform_attr(node),
            escape_xml(&t.text)
        ),
        _ => String::new(),
    }
}

pub fn export_rectangle(node: &Diagram) -> String {
    let Some(shape) = node.shape() else {
        return String::new();
    };
    format!(
        "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"{}{}/>{}",
        shape.x - shape.width / 2.0,
        shape.y - shape.height / 2.0,
        shape.width,
        shape.height,
        paint_attrs(node),
        transform_attr(node),
        text_element(node)
    )
}

pub fn export_ellipse(node: &Diagram) -> String {
    let Some(shape) = node.shape() else {
        return String::new();
    };
    format!(
        "<ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\"{}{}/>{}",
        shape.x,
        shape.y,
        shape.width / 2.0,
        shape.height / 2.0,
        paint_attrs(node),
        transform_attr(node),
        text_element(node)
    )
}

pub fn export_image(node: &Diagram) -> String {
    let (Some(shape), Some(Media::Image { base64 })) = (node.shape(), &node.media) else {
        return String::new();
    };
    format!(
        "<image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" href=\"{}\"{}/>",
        shape.x - shape.width / 2.0,
        shape.y - shape.height / 2.0,
        shape.width,
        shape.height,
        escape_xml(base64),
        transform_attr(node)
    )
}

/// Embedded SVG documents are nested as-is inside a positioned `<svg>`.
pub fn export_svg_node(node: &Diagram) -> String {
    let (Some(shape), Some(Media::Svg { text })) = (node.shape(), &node.media) else {
        return String::new();
    };
    format!(
        "<g{}><svg x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\">{}</svg></g>",
        transform_attr(node),
        shape.x - shape.width / 2.0,
        shape.y - shape.height / 2.0,
        shape.width,
        shape.height,
        text
    )
}

/// Paths and connectors: a polyline through the vertices, absolute coordinates.
pub fn export_polyline(node: &Diagram) -> String {
    let points = node
        .vertices()
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ");
    let (stroke, width) = node
        .stroke
        .as_ref()
        .map(|s| (escape_xml(&s.color), s.width))
        .unwrap_or_else(|| ("#000000".into(), 1.0));
    format!("<polyline points=\"{points}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"{width}\"/>")
}

/// Children already carry absolute geometry, so a group is a plain `<g>`.
pub fn export_group(node: &Diagram) -> String {
    let mut out = String::from("<g>");
    for child in node.children() {
        out.push_str(&export_node(child));
    }
    out.push_str("</g>");
    out
}

/// Export one node via its registry exporter (empty for non-exportable kinds).
pub fn export_node(node: &Diagram) -> String {
    registry::lookup(node.kind)
        .and_then(|entry| entry.export)
        .map(|export| export(node))
        .unwrap_or_default()
}

/// Export a whole tree as a standalone SVG document sized to its content.
pub fn export_svg(items: &[Diagram]) -> String {
    let mut content: Option<Bounds> = None;
    walk(items, &mut |d| {
        let b = match d.shape() {
            Some(shape) => shape.aabb(),
            None => Bounds::new(d.x, d.y, 0.0, 0.0),
        };
        content = Some(match content {
            Some(acc) => acc.union(&b),
            None => b,
        });
    });
    let b = content
        .unwrap_or(Bounds::new(400.0, 300.0, 800.0, 600.0))
        .expand(EXPORT_PADDING);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"{} {} {} {}\">",
        b.width,
        b.height,
        b.left(),
        b.top(),
        b.width,
        b.height
    );
    for item in items {
        let fragment = export_node(item);
        if !fragment.is_empty() {
            let _ = writeln!(svg, "  {fragment}");
        }
    }
    svg.push_str("</svg>\n");
    svg
}
