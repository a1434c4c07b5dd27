pub mod action_queue;
pub mod auto_click;
pub mod coordinator;
pub mod detection;
pub mod execution_engine;
pub mod focus_tracker;
pub mod hotkey_listener;
pub mod hotkey_scheduler;
pub mod injector;
pub mod key_sender;
pub mod monitoring;
pub mod notifier;
pub mod window_locator;

#[cfg(test)]
pub mod test_support;

pub use action_queue::ActionQueue;
pub use auto_click::AutoClickMonitor;
pub use coordinator::Coordinator;
pub use execution_engine::ExecutionEngine;
pub use focus_tracker::WindowFocusTracker;
pub use hotkey_listener::create_control_listener;
pub use injector::create_key_injector;
pub use key_sender::KeySender;
pub use monitoring::MonitoringLoop;
pub use notifier::{create_notifier, CommandReceiver};
pub use window_locator::create_window_locator;
