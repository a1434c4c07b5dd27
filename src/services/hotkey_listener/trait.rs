use crate::config::ControlConfig;
use crate::error::Result;
use crate::services::coordinator::Coordinator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Слушатель глобальных клавиш управления
#[async_trait::async_trait]
pub trait ControlListener: Send {
    /// Работает до отмены `cancel`
    async fn run(self: Box<Self>, coordinator: Arc<Coordinator>, cancel: CancellationToken) -> Result<()>;
}

/// Factory function to create the control listener based on the dry_run flag
pub fn create_control_listener(config: &ControlConfig, dry_run: bool) -> Result<Box<dyn ControlListener>> {
    if dry_run || !config.enabled {
        Ok(Box::new(super::dry_run::DryRunControlListener::new(dry_run)))
    } else {
        Ok(Box::new(super::evdev_listener::EvdevControlListener::new(config)?))
    }
}
