//! Document codec: persisted data ⇄ live state.
//!
//! Only the persistent "data" fields of each node are written. Ephemeral
//! interaction flags are `#[serde(skip)]` and come back as defaults;
//! `data_to_state` then re-derives any capability a kind must carry.
//!
//! Two encodings are supported: JSON (interchange, local storage) and
//! MessagePack (compact snapshots).

use crate::model::*;
use crate::registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasData {
    pub id: String,
    pub min_x: f64,
    pub min_y: f64,
    pub items: Vec<Diagram>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode MessagePack document: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("invalid MessagePack document: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("document root must be an object with an `items` array")]
    MissingItems,
}

// ─── State ⇄ data ────────────────────────────────────────────────────────

/// Re-initialize a decoded node (and its subtree) into live state.
///
/// Ephemeral flags start at their defaults; capabilities required by the
/// kind but absent from the data are filled in from registry defaults.
pub fn data_to_state(data: &Diagram) -> Diagram {
    let caps = registry::capabilities(data.kind);
    let mut node = data.clone();
    node.ui = UiState::default();

    if caps.transformative && node.transform.is_none() {
        node.transform = Some(Transform::default());
    }
    if caps.itemable && node.items.is_none() {
        node.items = Some(Vec::new());
    }
    if caps.strokable && node.stroke.is_none() {
        node.stroke = Some(Stroke::default());
    }
    if caps.fillable && node.fill.is_none() {
        node.fill = Some(Fill::default());
    }
    if caps.textable && node.text.is_none() {
        node.text = Some(TextBlock::default());
    }
    if let Some(exec) = node.executable.as_mut() {
        exec.is_executing = false;
    } else if caps.executable {
        node.executable = Some(Executable::default());
    }
    if caps.connectable && node.connect_points().is_empty() {
        node.connectable = Some(Connectable::default());
        node = registry::with_updated_connect_points(&node);
    }

    if let Some(children) = node.items.take() {
        node.items = Some(children.iter().map(data_to_state).collect());
    }
    node
}

/// Strip ephemeral state from a node (and its subtree) for persistence.
pub fn state_to_data(state: &Diagram) -> Diagram {
    let mut node = state.clone();
    node.ui = UiState::default();
    if let Some(exec) = node.executable.as_mut() {
        exec.is_executing = false;
    }
    if let Some(children) = node.items.take() {
        node.items = Some(children.iter().map(state_to_data).collect());
    }
    node
}

impl CanvasData {
    pub fn new(id: impl Into<String>, min_x: f64, min_y: f64, items: &[Diagram]) -> Self {
        Self {
            id: id.into(),
            min_x,
            min_y,
            items: items
                .iter()
                .filter(|d| !d.id.is_reserved())
                .map(state_to_data)
                .collect(),
        }
    }

    /// Items re-initialized as live state.
    pub fn to_state(&self) -> Vec<Diagram> {
        self.items.iter().map(data_to_state).collect()
    }

    // ─── JSON ────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON document. Nodes that fail to decode (unknown `type`,
    /// malformed fields) or that use a reserved id are skipped with a
    /// warning instead of failing the whole document.
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let mut root: Value = serde_json::from_str(text)?;
        let items = match root.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(DocumentError::MissingItems),
        };

        let id = root
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let min_x = root.get("minX").and_then(Value::as_f64).unwrap_or(0.0);
        let min_y = root.get("minY").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(Self {
            id,
            min_x,
            min_y,
            items: items.into_iter().filter_map(decode_node).collect(),
        })
    }

    // ─── MessagePack ─────────────────────────────────────────────────────

    pub fn to_msgpack(&self) -> Result<Vec<u8>, DocumentError> {
        // Named encoding: optional fields are skipped when absent.
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

fn decode_node(mut value: Value) -> Option<Diagram> {
    let children = value.as_object_mut().and_then(|o| o.remove("items"));
    let mut node: Diagram = match serde_json::from_value(value) {
        Ok(node) => node,
        Err(err) => {
            log::warn!("skipping undecodable node: {err}");
            return None;
        }
    };
    if node.id.is_reserved() {
        log::warn!("skipping node with reserved id {}", node.id);
        return None;
    }
    match children {
        Some(Value::Array(children)) => {
            node.items = Some(children.into_iter().filter_map(decode_node).collect());
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            log::warn!("ignoring non-array items on {}: {other}", node.id);
        }
    }
    Some(node)
}
