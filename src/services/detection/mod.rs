//! Detection service: responsibility and boundaries
//!
//! This module captures regions of the game window and compares them with reference templates.
//! It only REPORTS what it sees as a `DetectionResult`; alerting, cooldowns and stopping the macro
//! are decided by the monitoring loop. The auto-click trigger reuses the same capture and matching
//! path for its own region.

mod capture;
mod matcher;
mod orchestrator;
mod region_check;
mod trigger;

pub use self::capture::{create_screen_capturer, encode_png, ScreenCapturer};
pub use self::matcher::NccMatcher;
pub use self::orchestrator::{DetectionOrchestrator, StateDetector};
pub use self::trigger::{RegionTrigger, TemplateTrigger};
