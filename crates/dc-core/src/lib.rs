pub mod export;
pub mod geometry;
pub mod id;
pub mod model;
pub mod persist;
pub mod registry;

pub use export::export_svg;
pub use geometry::{Bounds, Point, Shape, Viewport};
pub use id::NodeId;
pub use model::*;
pub use persist::{CanvasData, DocumentError, data_to_state, state_to_data};
pub use registry::{Capabilities, RegistryEntry};
