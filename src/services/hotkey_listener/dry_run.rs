use crate::error::Result;
use crate::services::coordinator::Coordinator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::r#trait::ControlListener;

/// Ничего не слушает; управление только через Telegram или `--autostart`
pub struct DryRunControlListener {
    dry_run: bool,
}

impl DryRunControlListener {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

#[async_trait::async_trait]
impl ControlListener for DryRunControlListener {
    async fn run(self: Box<Self>, _coordinator: Arc<Coordinator>, cancel: CancellationToken) -> Result<()> {
        if self.dry_run {
            info!("Dry-run режим - клавиши управления не отслеживаются");
        } else {
            info!("Клавиши управления отключены в конфигурации");
        }
        cancel.cancelled().await;
        Ok(())
    }
}
