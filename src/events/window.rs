use serde::{Deserialize, Serialize};
use std::fmt;

/// Описание целевого процесса игры
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessTarget {
    pub process_name: String,
    pub window_title: Option<String>,
}

impl ProcessTarget {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            window_title: None,
        }
    }

    pub fn with_window_title(mut self, title: Option<String>) -> Self {
        self.window_title = title.filter(|t| !t.trim().is_empty());
        self
    }

    /// Имя процесса без расширения `.exe`, в нижнем регистре
    pub fn normalized_name(&self) -> String {
        let lower = self.process_name.trim().to_lowercase();
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    }

    /// Проверить, соответствует ли имя процесса цели (регистронезависимо, `.exe` игнорируется)
    pub fn matches_process(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        let candidate = lower.strip_suffix(".exe").unwrap_or(&lower);
        candidate == self.normalized_name()
    }

    /// Проверить заголовок окна по фильтру (пустой фильтр означает "любое окно")
    pub fn matches_title(&self, title: &str) -> bool {
        match &self.window_title {
            Some(pattern) => title.to_lowercase().contains(&pattern.to_lowercase()),
            None => true,
        }
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.window_title {
            Some(title) => write!(f, "{} (\"{}\")", self.process_name, title),
            None => write!(f, "{}", self.process_name),
        }
    }
}

/// Дескриптор окна целевого процесса.
///
/// `id` - идентификатор окна в терминах backend'а (число X11 у xdotool, UUID у kdotool).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle {
    pub id: String,
    pub pid: u32,
}

impl WindowHandle {
    pub fn new(id: impl Into<String>, pid: u32) -> Self {
        Self { id: id.into(), pid }
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (PID: {})", self.id, self.pid)
    }
}

/// Геометрия окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Прямоугольная область относительно окна, задаётся углами `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Перевести область в абсолютные координаты экрана
    pub fn offset_by(&self, geometry: &WindowGeometry) -> Region {
        Region::new(
            self.x1 + geometry.x,
            self.y1 + geometry.y,
            self.x2 + geometry.x,
            self.y2 + geometry.y,
        )
    }
}

impl From<[i32; 4]> for Region {
    fn from(c: [i32; 4]) -> Self {
        Region::new(c[0], c[1], c[2], c[3])
    }
}

impl From<Region> for [i32; 4] {
    fn from(r: Region) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width(), self.height(), self.x1, self.y1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_target_matching() {
        let target = ProcessTarget::new("MapleStory.exe");

        assert!(target.matches_process("maplestory"));
        assert!(target.matches_process("MapleStory.EXE"));
        assert!(!target.matches_process("maplestory-launcher"));
        assert!(target.matches_title("anything"));

        let target = target.with_window_title(Some("Ranmelle".to_string()));
        assert!(target.matches_title("ranmelle - world 1"));
        assert!(!target.matches_title("chat"));
    }

    #[test]
    fn test_region_geometry() {
        let region = Region::new(600, 424, 891, 1057);
        assert_eq!(region.width(), 291);
        assert_eq!(region.height(), 633);
        assert!(!region.is_empty());
        assert!(Region::new(10, 10, 5, 20).is_empty());

        let geometry = WindowGeometry { x: 100, y: 50, width: 1920, height: 1080 };
        assert_eq!(region.offset_by(&geometry), Region::new(700, 474, 991, 1107));
        assert_eq!(region.to_string(), "291x633+600+424");
    }
}
