use crate::error::{AutomacroError, Result};
use evdev::{Device, KeyCode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Имена устройств, которые только притворяются клавиатурами
const NOT_KEYBOARDS: &[&str] = &["mouse", "deathadder", "touchpad", "trackpoint", "automacro"];

/// Поиск клавиатуры для клавиш управления
pub struct DeviceFinder;

impl DeviceFinder {
    /// `auto` - автопоиск, иначе путь к конкретному `/dev/input/event*`
    pub fn find_keyboard_device(device_path: &str) -> Result<PathBuf> {
        if device_path != "auto" {
            let path = PathBuf::from(device_path);
            return if path.exists() {
                info!("Используется указанное устройство: {:?}", path);
                Ok(path)
            } else {
                AutomacroError::device_not_found(format!("Указанное устройство не найдено: {:?}", path))
            };
        }

        info!("Автопоиск клавиатурного устройства...");

        if let Some(device) = Self::find_by_id() {
            info!("Найдено устройство по ID: {:?}", device);
            return Ok(device);
        }

        if let Some(device) = Self::find_by_event_devices()? {
            info!("Найдено устройство среди event устройств: {:?}", device);
            return Ok(device);
        }

        AutomacroError::device_not_found(
            "Не удалось найти клавиатуру. Убедитесь, что пользователь добавлен в группу 'input'",
        )
    }

    /// `/dev/input/by-id/*-event-kbd` с приоритетом по имени
    fn find_by_id() -> Option<PathBuf> {
        let entries = match fs::read_dir("/dev/input/by-id") {
            Ok(entries) => entries,
            Err(e) => {
                debug!("/dev/input/by-id недоступна: {}", e);
                return None;
            }
        };

        let mut keyboards: Vec<(PathBuf, u32)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                if !name.contains("event") || !(name.contains("kbd") || name.to_lowercase().contains("keyboard")) {
                    return None;
                }
                if !Self::is_keyboard_device(&path) {
                    debug!("Не подходит как клавиатура: {}", name);
                    return None;
                }
                let priority = if name.ends_with("event-kbd") {
                    100
                } else if name.to_lowercase().contains("keyboard") {
                    50
                } else {
                    10
                };
                debug!("Кандидат: {} (приоритет {})", name, priority);
                Some((path, priority))
            })
            .collect();

        keyboards.sort_by(|a, b| b.1.cmp(&a.1));
        keyboards.into_iter().next().map(|(path, _)| path)
    }

    fn find_by_event_devices() -> Result<Option<PathBuf>> {
        let entries = fs::read_dir("/dev/input")
            .map_err(|e| AutomacroError::Permission(format!("Нет доступа к /dev/input: {}", e)))?;

        let mut event_devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("event"))
            })
            .collect();
        event_devices.sort();

        Ok(event_devices.into_iter().find(|path| Self::is_keyboard_device(path)))
    }

    /// Открывается, не мышь и умеет хотя бы буквы, пробел и Enter
    fn is_keyboard_device(device_path: &Path) -> bool {
        let device = match Device::open(device_path) {
            Ok(device) => device,
            Err(e) => {
                warn!("Устройство {:?} недоступно: {}", device_path, e);
                return false;
            }
        };

        let name = device.name().unwrap_or("Unknown").to_lowercase();
        if NOT_KEYBOARDS.iter().any(|marker| name.contains(marker)) {
            debug!("Исключаем устройство {:?} ({})", device_path, name);
            return false;
        }

        device.supported_keys().is_some_and(|keys| {
            keys.contains(KeyCode::KEY_A)
                && keys.contains(KeyCode::KEY_SPACE)
                && keys.contains(KeyCode::KEY_ENTER)
                && keys.iter().count() > 20
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path() {
        let result = DeviceFinder::find_keyboard_device("/non/existent/path");
        assert!(matches!(result, Err(AutomacroError::DeviceNotFound(_))));
    }
}
