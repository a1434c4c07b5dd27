mod commands;
mod telegram;
mod r#trait;

pub use self::commands::CommandReceiver;
pub use self::r#trait::{create_notifier, Notifier};
