use std::fmt;

/// Результат одной проверки состояния игры.
///
/// `success == false` означает сбой самой инфраструктуры детекции (окно не найдено,
/// захват не удался, шаблоны не загружены) и должен трактоваться как "неизвестно",
/// а не как отсутствие интерфейса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionResult {
    pub success: bool,
    pub popup_detected: bool,
    pub ui_detected: bool,
    pub game_running: bool,
}

impl DetectionResult {
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn detected(popup_detected: bool, ui_detected: bool) -> Self {
        Self {
            success: true,
            popup_detected,
            ui_detected,
            game_running: true,
        }
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.success {
            return write!(f, "неизвестно (сбой детекции)");
        }
        write!(
            f,
            "popup={}, ui={}, game={}",
            self.popup_detected, self.ui_detected, self.game_running
        )
    }
}
