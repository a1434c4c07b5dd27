use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{SystemAlert, StatusMessage};

const CHANNEL_CAPACITY: usize = 256;

/// Шина событий: статусные сообщения и системные оповещения.
///
/// Передаётся компонентам при создании. Каждое статусное сообщение дублируется в `tracing`,
/// поэтому отсутствие подписчиков ничего не ломает.
pub struct EventBus {
    status_tx: broadcast::Sender<StatusMessage>,
    alert_tx: broadcast::Sender<SystemAlert>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (alert_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { status_tx, alert_tx }
    }

    pub fn log(&self, component: &'static str, message: impl Into<String>) {
        let message = message.into();
        info!(component, "{}", message);
        // Ошибка означает только отсутствие подписчиков
        let _ = self.status_tx.send(StatusMessage { component, message });
    }

    pub fn alert(&self, alert: SystemAlert) {
        warn!(kind = %alert.kind, "Системное оповещение: {}", alert.message);
        let _ = self.alert_tx.send(alert);
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusMessage> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<SystemAlert> {
        self.alert_tx.subscribe()
    }
}
