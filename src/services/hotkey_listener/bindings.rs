use crate::automacro_error;
use crate::config::ControlConfig;
use crate::error::Result;
use crate::mappings::KeyNames;
use crate::services::coordinator::Coordinator;
use evdev::KeyCode;
use tracing::info;

/// Команда глобальной клавиши управления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Запуск, если система стоит, иначе остановка
    Toggle,
    EmergencyStop,
    TogglePause,
}

/// Назначение клавиш управления
#[derive(Debug, Clone, Copy)]
pub struct ControlBindings {
    toggle: KeyCode,
    emergency_stop: KeyCode,
    pause: Option<KeyCode>,
}

fn resolve(key: &str, field: &str) -> Result<KeyCode> {
    KeyNames::resolve(key).ok_or_else(|| automacro_error!(internal, "Неизвестная клавиша '{}' в {}", key, field))
}

impl ControlBindings {
    pub fn from_config(config: &ControlConfig) -> Result<Self> {
        Ok(Self {
            toggle: resolve(&config.toggle_key, "control.toggle_key")?,
            emergency_stop: resolve(&config.emergency_stop_key, "control.emergency_stop_key")?,
            pause: config
                .pause_key
                .as_deref()
                .map(|key| resolve(key, "control.pause_key"))
                .transpose()?,
        })
    }

    /// Команда для события клавиши; реагируем только на нажатие (value 1), автоповтор и отпускание игнорируются
    pub fn command_for(&self, code: u16, value: i32) -> Option<ControlCommand> {
        if value != 1 {
            return None;
        }
        let key = KeyCode::new(code);
        if key == self.toggle {
            Some(ControlCommand::Toggle)
        } else if key == self.emergency_stop {
            Some(ControlCommand::EmergencyStop)
        } else if Some(key) == self.pause {
            Some(ControlCommand::TogglePause)
        } else {
            None
        }
    }
}

/// Выполнить команду управления через координатор
pub(super) async fn dispatch(coordinator: &Coordinator, command: ControlCommand) {
    match command {
        ControlCommand::Toggle => {
            if coordinator.is_system_running() {
                info!("⌨️ Клавиша управления: остановка");
                coordinator.stop_all().await;
            } else {
                info!("⌨️ Клавиша управления: запуск");
                if coordinator.start_all().await {
                    coordinator.focus_game_window().await;
                }
            }
        }
        ControlCommand::EmergencyStop => {
            if coordinator.stop_all().await {
                info!("🛑 Аварийная остановка");
            }
        }
        ControlCommand::TogglePause => {
            coordinator.toggle_macro_pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{self, FakeLocator};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[test]
    fn test_default_bindings() {
        let bindings = ControlBindings::from_config(&ControlConfig::default()).unwrap();

        assert_eq!(bindings.command_for(KeyCode::KEY_F9.code(), 1), Some(ControlCommand::Toggle));
        assert_eq!(bindings.command_for(KeyCode::KEY_F9.code(), 0), None);
        assert_eq!(bindings.command_for(KeyCode::KEY_F9.code(), 2), None);
        assert_eq!(
            bindings.command_for(KeyCode::KEY_BACKSLASH.code(), 1),
            Some(ControlCommand::EmergencyStop)
        );
        assert_eq!(bindings.command_for(KeyCode::KEY_P.code(), 1), None);
    }

    #[test]
    fn test_optional_pause_key() {
        let config = ControlConfig {
            pause_key: Some("Pause".to_string()),
            ..ControlConfig::default()
        };
        assert!(ControlBindings::from_config(&config).is_err());

        let config = ControlConfig {
            pause_key: Some("F10".to_string()),
            ..ControlConfig::default()
        };
        let bindings = ControlBindings::from_config(&config).unwrap();
        assert_eq!(bindings.command_for(KeyCode::KEY_F10.code(), 1), Some(ControlCommand::TogglePause));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_starts_then_stops() {
        let locator = Arc::new(FakeLocator::new());
        let coordinator = test_support::coordinator(locator.clone());

        dispatch(&coordinator, ControlCommand::Toggle).await;
        assert!(coordinator.is_macro_running());
        assert_eq!(locator.raised.load(Ordering::SeqCst), 1);

        dispatch(&coordinator, ControlCommand::TogglePause).await;
        assert_eq!(coordinator.macro_state(), crate::events::EngineState::Paused);

        dispatch(&coordinator, ControlCommand::Toggle).await;
        assert!(!coordinator.is_macro_running());

        // Аварийная остановка уже остановленной системы ничего не делает
        dispatch(&coordinator, ControlCommand::EmergencyStop).await;
        assert!(!coordinator.is_system_running());
        coordinator.shutdown().await;
    }
}
