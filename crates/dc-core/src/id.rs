use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Process-wide interner backing every `NodeId`.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Reserved id of the synthetic multi-select group. Never serialized.
pub const MULTI_SELECT_GROUP_ID: &str = "__multi_select_group__";

/// Reserved id of a vertex inserted by a midpoint-handle drag that has
/// not been finalized yet.
pub const NEW_VERTEX_ID: &str = "__new_vertex__";

/// A lightweight, interned identifier for diagram nodes and connect points.
/// A `Spur` index into the interner: `Copy`, hashed in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Spur);

impl NodeId {
    /// Intern a string as a NodeId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        NodeId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a globally unique id for a newly created node or vertex.
    pub fn fresh() -> Self {
        Self::intern(&uuid::Uuid::new_v4().to_string())
    }

    /// The reserved id of the synthetic multi-select group.
    pub fn multi_select_group() -> Self {
        Self::intern(MULTI_SELECT_GROUP_ID)
    }

    /// The reserved id of a not-yet-finalized inserted vertex.
    pub fn new_vertex() -> Self {
        Self::intern(NEW_VERTEX_ID)
    }

    /// Whether this id is one of the reserved, never-persisted ids.
    pub fn is_reserved(&self) -> bool {
        matches!(self.as_str(), MULTI_SELECT_GROUP_ID | NEW_VERTEX_ID)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeId::intern(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = NodeId::intern("rect-1");
        let b = NodeId::intern("rect-1");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "rect-1");
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = NodeId::fresh();
        let b = NodeId::fresh();
        assert_ne!(a, b);
        assert!(!a.is_reserved());
    }

    #[test]
    fn reserved_ids_are_recognized() {
        assert!(NodeId::multi_select_group().is_reserved());
        assert!(NodeId::new_vertex().is_reserved());
    }
}
