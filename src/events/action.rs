use std::fmt;
use tokio::time::Instant;

/// Тип действия ввода
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Нажатие с удержанием на `duration_ms`
    Press,
    /// Только нажатие (для модификаторов)
    Down,
    /// Только отпускание
    Up,
    /// Щелчок левой кнопкой мыши в точке экрана
    Click { x: i32, y: i32 },
}

/// Неизменяемое действие ввода; исполняется воркером очереди ровно один раз
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: String,
    pub key: String,
    pub duration_ms: u64,
    pub kind: ActionKind,
    pub due_time: Instant,
}

impl Action {
    pub fn new(id: impl Into<String>, key: impl Into<String>, duration_ms: u64, kind: ActionKind, due_time: Instant) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            duration_ms,
            kind,
            due_time,
        }
    }

    pub fn press(id: impl Into<String>, key: impl Into<String>, duration_ms: u64, due_time: Instant) -> Self {
        Self::new(id, key, duration_ms, ActionKind::Press, due_time)
    }

    pub fn key_down(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(id, key, 0, ActionKind::Down, Instant::now())
    }

    pub fn key_up(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(id, key, 0, ActionKind::Up, Instant::now())
    }

    pub fn click(id: impl Into<String>, x: i32, y: i32) -> Self {
        Self::new(id, "mouse_left", 0, ActionKind::Click { x, y }, Instant::now())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Press => write!(f, "{}='{}' ({}мс)", self.id, self.key, self.duration_ms),
            ActionKind::Down => write!(f, "{}='{}' ↓", self.id, self.key),
            ActionKind::Up => write!(f, "{}='{}' ↑", self.id, self.key),
            ActionKind::Click { x, y } => write!(f, "{}=щелчок ({}, {})", self.id, x, y),
        }
    }
}
