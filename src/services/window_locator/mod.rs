//! WindowLocator service: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for locating the target process and its
//! window, reporting input focus and raising the window. They MUST NOT make scheduling decisions:
//! what to do when focus is lost is decided by the execution engine.

mod dry_run;
mod process;
mod tool;
mod r#trait;

pub use self::r#trait::{create_window_locator, WindowLocator};
