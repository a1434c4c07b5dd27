use crate::config::TelegramConfig;
use crate::error::Result;
use crate::events::AlertKind;
use std::sync::Arc;
use tracing::{info, warn};

use super::telegram::{TelegramApi, TelegramNotifier};

/// Исходящие оповещения оператору.
///
/// `send` не ждёт доставки: вызывается из циклов планирования и мониторинга.
pub trait Notifier: Send + Sync {
    fn send(&self, kind: AlertKind, context: &str);
}

/// Оповещения только в лог, когда Telegram не настроен
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, kind: AlertKind, context: &str) {
        info!(%kind, "Оповещение (Telegram не настроен): {}", context);
    }
}

/// Factory function to create the notifier from the telegram section
pub fn create_notifier(config: &TelegramConfig) -> Result<Arc<dyn Notifier>> {
    if !config.is_usable() {
        if config.enabled {
            warn!("Telegram включён, но bot_token или chat_id не заданы - оповещения только в лог");
        }
        return Ok(Arc::new(LogNotifier));
    }

    let api = TelegramApi::from_config(config)?;
    info!("Оповещения в Telegram включены");
    Ok(Arc::new(TelegramNotifier::new(api)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_telegram_falls_back_to_log() {
        let config = TelegramConfig::default();
        assert!(create_notifier(&config).is_ok());

        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("  ".to_string()),
            ..TelegramConfig::default()
        };
        assert!(!config.is_usable());
        assert!(create_notifier(&config).is_ok());
    }
}
