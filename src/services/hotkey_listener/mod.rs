mod bindings;
mod dry_run;
mod evdev_listener;
mod r#trait;

pub use self::r#trait::create_control_listener;
