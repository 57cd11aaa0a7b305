//! Engine tuning knobs.
//!
//! Every field has a default, so a host can pass a partial JSON object
//! (or nothing at all) and get a usable engine.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum number of history entries kept; the oldest are dropped first.
    pub history_depth: usize,
    /// Distance a connector keeps from its owners before its first bend.
    pub connect_margin: f64,
    /// Client-space distance from the viewport edge that starts auto-scroll.
    pub edge_scroll_threshold: f64,
    /// Client-space distance the viewport moves per auto-scroll tick.
    pub edge_scroll_step: f64,
    /// Extra route cost charged for every bend, in canvas units.
    pub bend_penalty: f64,
    /// Smallest width/height a handle resize can produce.
    pub min_shape_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: 200,
            connect_margin: 20.0,
            edge_scroll_threshold: 30.0,
            edge_scroll_step: 8.0,
            bend_penalty: 40.0,
            min_shape_size: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"connectMargin": 32, "historyDepth": 5}"#).unwrap();
        assert_eq!(config.connect_margin, 32.0);
        assert_eq!(config.history_depth, 5);
        assert_eq!(config.bend_penalty, EngineConfig::default().bend_penalty);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }
}
