use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MessagesConfig;

/// Вид оповещения мониторинга
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    PopupDetected,
    UiCheckFailed,
    GameNotRunning,
}

impl AlertKind {
    /// Текст оповещения для оператора
    pub fn message<'a>(&self, messages: &'a MessagesConfig) -> &'a str {
        match self {
            AlertKind::PopupDetected => &messages.popup_detected,
            AlertKind::UiCheckFailed => &messages.ui_check_failed,
            AlertKind::GameNotRunning => &messages.game_not_running,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::PopupDetected => "popup",
            AlertKind::UiCheckFailed => "ui-check-failed",
            AlertKind::GameNotRunning => "game-not-running",
        };
        f.write_str(name)
    }
}

/// Системное оповещение для внешнего потребителя (UI, CLI)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAlert {
    pub kind: AlertKind,
    pub message: String,
}

/// Статусное сообщение компонента
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub component: &'static str,
    pub message: String,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component, self.message)
    }
}

/// Состояние движка исполнения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Stopped => "остановлен",
            EngineState::Running => "работает",
            EngineState::Paused => "на паузе",
        };
        f.write_str(name)
    }
}
