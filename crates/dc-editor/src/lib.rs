pub mod config;
pub mod connect;
pub mod engine;
pub mod history;
pub mod hit;
pub mod input;
pub mod routing;
pub mod scroll;
pub mod selection;
pub mod transform;

pub use config::EngineConfig;
pub use engine::{CanvasEngine, CanvasObserver, CanvasState, ExecutionNotice, InteractionMode};
pub use history::{History, Snapshot};
pub use input::{
    ConnectError, ConnectEvent, DragEvent, EventPhase, ExecuteEvent, PathPointData, SelectEvent,
    TransformEvent,
};
pub use scroll::ScrollChange;
pub use selection::{AreaSelection, SelectionError};
pub use transform::{TransformBaseline, TransformHandle};
