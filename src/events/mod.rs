pub mod action;
pub mod alert;
pub mod bus;
pub mod detection;
pub mod window;

pub use action::{Action, ActionKind};
pub use alert::{AlertKind, EngineState, StatusMessage, SystemAlert};
pub use bus::EventBus;
pub use detection::DetectionResult;
pub use window::{ProcessTarget, Region, WindowGeometry, WindowHandle};
