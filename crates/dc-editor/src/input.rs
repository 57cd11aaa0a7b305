//! Normalized interaction events.
//!
//! The host translates raw pointer/keyboard input into these typed events
//! (canvas coordinates, one phase per gesture step) and feeds them to the
//! engine. Only `End` and `Instant` phases produce history entries.

use dc_core::geometry::{Point, Shape};
use dc_core::id::NodeId;
use dc_core::model::{Diagram, DiagramIndex, DiagramKind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// Where an event sits within its gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPhase {
    Start,
    InProgress,
    End,
    /// A complete one-shot change (keyboard, programmatic edit).
    Instant,
}

impl EventPhase {
    /// Whether this step finishes a gesture and must be committed.
    pub fn commits(self) -> bool {
        matches!(self, EventPhase::End | EventPhase::Instant)
    }

    pub fn starts(self) -> bool {
        matches!(self, EventPhase::Start | EventPhase::Instant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEvent {
    pub phase: EventPhase,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
}

impl DragEvent {
    pub fn new(phase: EventPhase, start: Point, end: Point) -> Self {
        Self {
            phase,
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
        }
    }

    pub fn start(&self) -> Point {
        Point::new(self.start_x, self.start_y)
    }

    pub fn end(&self) -> Point {
        Point::new(self.end_x, self.end_y)
    }

    pub fn delta(&self) -> (f64, f64) {
        (self.end_x - self.start_x, self.end_y - self.start_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformEvent {
    pub phase: EventPhase,
    pub start_shape: Shape,
    pub end_shape: Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectEvent {
    pub id: NodeId,
    /// Ctrl/Cmd held: toggle instead of replace.
    #[serde(default)]
    pub is_multi_select: bool,
}

/// One vertex of a proposed connector.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PathPointData {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

impl PathPointData {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A finished manual-connect gesture: the full vertex list from the source
/// connect point to the target connect point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectEvent {
    pub start_owner_id: NodeId,
    pub end_owner_id: NodeId,
    pub points: Vec<PathPointData>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("malformed connect payload: {0}")]
    Malformed(String),
    #[error("a connector needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("unknown or unconnectable owner {0}")]
    UnknownOwner(NodeId),
    #[error("cannot connect {0} to itself")]
    SameOwner(NodeId),
    #[error("point {point} is not a connect point of {owner}")]
    NotAnEndpoint { point: NodeId, owner: NodeId },
    #[error("duplicate or reserved vertex id {0}")]
    BadVertexId(NodeId),
}

impl ConnectEvent {
    /// Decode an untyped payload. Anything that is not a well-formed
    /// connect event is rejected here, before the tree is touched.
    pub fn from_value(value: &Value) -> Result<Self, ConnectError> {
        serde_json::from_value(value.clone()).map_err(|e| ConnectError::Malformed(e.to_string()))
    }

    /// Check the event against the current tree: both owners exist and are
    /// connectable, the endpoints are their connect points, and every
    /// vertex id is unique, unreserved and unused by any other node.
    pub fn validate(&self, items: &[Diagram]) -> Result<(), ConnectError> {
        if self.points.len() < 2 {
            return Err(ConnectError::TooFewPoints(self.points.len()));
        }
        if self.start_owner_id == self.end_owner_id {
            return Err(ConnectError::SameOwner(self.start_owner_id));
        }

        let index = DiagramIndex::build(items);
        for owner_id in [self.start_owner_id, self.end_owner_id] {
            let connectable = index
                .get(items, owner_id)
                .is_some_and(|d| d.kind != DiagramKind::ConnectLine && !d.connect_points().is_empty());
            if !connectable {
                return Err(ConnectError::UnknownOwner(owner_id));
            }
        }

        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);
        for (point, owner) in [(first, self.start_owner_id), (last, self.end_owner_id)] {
            if index.owner_of_point(point.id) != Some(owner) {
                return Err(ConnectError::NotAnEndpoint {
                    point: point.id,
                    owner,
                });
            }
        }

        // Endpoint ids are shared with the connect points (and with any other
        // connector on the same point); interior ids must be new.
        let mut seen = HashSet::new();
        for (i, p) in self.points.iter().enumerate() {
            let interior = i > 0 && i + 1 < self.points.len();
            let taken = index.contains(p.id) || index.owner_of_point(p.id).is_some();
            if p.id.is_reserved() || !seen.insert(p.id) || (interior && taken) {
                return Err(ConnectError::BadVertexId(p.id));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteEvent {
    pub id: NodeId,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_core::registry::create;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn two_boxes() -> Vec<Diagram> {
        vec![
            create(DiagramKind::Rectangle, 0.0, 0.0).unwrap(),
            create(DiagramKind::Rectangle, 300.0, 0.0).unwrap(),
        ]
    }

    fn payload(items: &[Diagram]) -> ConnectEvent {
        let a = items[0].connect_points()[3].clone();
        let b = items[1].connect_points()[2].clone();
        ConnectEvent {
            start_owner_id: items[0].id,
            end_owner_id: items[1].id,
            points: vec![
                PathPointData { id: a.id, x: a.x, y: a.y },
                PathPointData { id: NodeId::fresh(), x: 150.0, y: 0.0 },
                PathPointData { id: b.id, x: b.x, y: b.y },
            ],
        }
    }

    #[test]
    fn phases_commit_only_at_end() {
        assert!(!EventPhase::Start.commits());
        assert!(!EventPhase::InProgress.commits());
        assert!(EventPhase::End.commits());
        assert!(EventPhase::Instant.commits());
    }

    #[test]
    fn drag_event_from_json() {
        let e: DragEvent = serde_json::from_value(json!({
            "phase": "inProgress", "startX": 1, "startY": 2, "endX": 11, "endY": -3
        }))
        .unwrap();
        assert_eq!(e.phase, EventPhase::InProgress);
        assert_eq!(e.delta(), (10.0, -5.0));
    }

    #[test]
    fn valid_connect_event_passes() {
        let items = two_boxes();
        assert_eq!(payload(&items).validate(&items), Ok(()));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = ConnectEvent::from_value(&json!({"startOwnerId": "a", "points": 3}));
        assert!(matches!(err, Err(ConnectError::Malformed(_))));
    }

    #[test]
    fn endpoint_must_belong_to_owner() {
        let items = two_boxes();
        let mut event = payload(&items);
        event.points.swap(0, 2);
        assert!(matches!(
            event.validate(&items),
            Err(ConnectError::NotAnEndpoint { .. })
        ));
    }

    #[test]
    fn interior_vertex_cannot_reuse_a_connect_point_id() {
        let items = two_boxes();
        let mut event = payload(&items);
        let borrowed = items[1].connect_points()[0].id;
        event.points[1].id = borrowed;
        assert_eq!(event.validate(&items), Err(ConnectError::BadVertexId(borrowed)));
    }

    #[test]
    fn self_connection_is_rejected() {
        let items = two_boxes();
        let mut event = payload(&items);
        event.end_owner_id = event.start_owner_id;
        assert_eq!(
            event.validate(&items),
            Err(ConnectError::SameOwner(items[0].id))
        );
    }

    #[test]
    fn reserved_vertex_id_is_rejected() {
        let items = two_boxes();
        let mut event = payload(&items);
        event.points[1].id = NodeId::new_vertex();
        assert_eq!(
            event.validate(&items),
            Err(ConnectError::BadVertexId(NodeId::new_vertex()))
        );
    }
}
