mod r#trait;
mod virtual_device;

pub use self::r#trait::{create_key_injector, KeyInjector};
