use crate::error::{AutomacroError, Result};
use crate::mappings::KeyNames;
use dashmap::DashSet;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uinput::event::absolute::Position;
use uinput::event::controller::{Controller, Mouse};

use super::r#trait::KeyInjector;

const EV_KEY: i32 = 1;
const EV_SYN: i32 = 0;

const LEFT_BUTTON: Controller = Controller::Mouse(Mouse::Left);

/// Виртуальная клавиатура uinput и (по запросу) указатель с абсолютными координатами.
///
/// uinput пишет ввод глобально, в окно с фокусом; доставку именно в окно игры
/// обеспечивает проверка фокуса перед постановкой действий в очередь.
pub struct VirtualDevice {
    device: Option<Mutex<uinput::Device>>,
    pointer: Option<Mutex<uinput::Device>>,
    pointer_enabled: bool,
    device_name: String,
    dry_run: bool,
    held_keys: DashSet<u16>,
}

impl VirtualDevice {
    pub fn new(device_name: &str, dry_run: bool) -> Result<Self> {
        info!("Инициализация VirtualDevice '{}' (dry_run: {})", device_name, dry_run);

        let device = if dry_run {
            None
        } else {
            Some(Mutex::new(Self::create_virtual_device(device_name)?))
        };

        Ok(Self {
            device,
            pointer: None,
            pointer_enabled: false,
            device_name: device_name.to_string(),
            dry_run,
            held_keys: DashSet::new(),
        })
    }

    fn create_virtual_device(device_name: &str) -> Result<uinput::Device> {
        info!("Создание виртуального устройства uinput '{}' для инъекции клавиш", device_name);

        let virtual_device = uinput::default()?
            .name(device_name)?
            .event(uinput::event::Keyboard::All)?
            .create()
            .map_err(|e| {
                AutomacroError::Internal(format!(
                    "Не удалось создать виртуальное устройство '{}': {}",
                    device_name, e
                ))
            })?;

        info!("Виртуальное устройство '{}' создано успешно", device_name);
        Ok(virtual_device)
    }

    /// Добавить указатель; диапазон осей совпадает с разрешением экрана, так что координаты абсолютные
    pub fn with_pointer(mut self, screen_width: u32, screen_height: u32) -> Result<Self> {
        if !self.dry_run {
            self.pointer = Some(Mutex::new(Self::create_pointer_device(
                &format!("{} Pointer", self.device_name),
                screen_width,
                screen_height,
            )?));
        }
        self.pointer_enabled = true;
        Ok(self)
    }

    fn create_pointer_device(name: &str, width: u32, height: u32) -> Result<uinput::Device> {
        info!("Создание виртуального указателя '{}' ({}x{})", name, width, height);

        uinput::default()?
            .name(name)?
            .event(LEFT_BUTTON)?
            .event(Position::X)?
            .min(0)
            .max(width.saturating_sub(1) as i32)
            .event(Position::Y)?
            .min(0)
            .max(height.saturating_sub(1) as i32)
            .create()
            .map_err(|e| AutomacroError::Internal(format!("Не удалось создать виртуальный указатель '{}': {}", name, e)))
    }

    fn send_key(&self, key: &str, pressed: bool) -> Result<()> {
        let code = KeyNames::code(key)
            .ok_or_else(|| AutomacroError::injection(key, "неизвестная клавиша"))?;

        if pressed {
            self.held_keys.insert(code);
        } else {
            self.held_keys.remove(&code);
        }

        if self.dry_run {
            info!("[DRY RUN] {} '{}'", if pressed { "KeyDown" } else { "KeyUp" }, key);
            return Ok(());
        }

        let Some(device) = &self.device else {
            return Err(AutomacroError::injection(key, "виртуальное устройство недоступно"));
        };

        let mut device = device.lock();
        device
            .write(EV_KEY, code as i32, if pressed { 1 } else { 0 })
            .map_err(|e| AutomacroError::injection(key, e.to_string()))?;
        device
            .write(EV_SYN, 0, 0)
            .map_err(|e| AutomacroError::injection(key, format!("синхронизация: {}", e)))?;

        debug!("Виртуальное событие {} для '{}' отправлено", if pressed { "↓" } else { "↑" }, key);
        Ok(())
    }
}

impl KeyInjector for VirtualDevice {
    fn key_down(&self, key: &str) -> Result<()> {
        self.send_key(key, true)
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.send_key(key, false)
    }

    fn click(&self, x: i32, y: i32) -> Result<()> {
        if !self.pointer_enabled {
            return Err(AutomacroError::injection("mouse_left", "виртуальный указатель не создан"));
        }
        if self.dry_run {
            info!("[DRY RUN] Щелчок в ({}, {})", x, y);
            return Ok(());
        }
        let Some(pointer) = &self.pointer else {
            return Err(AutomacroError::injection("mouse_left", "виртуальный указатель недоступен"));
        };

        let mut pointer = pointer.lock();
        let to_error = |e: uinput::Error| AutomacroError::injection("mouse_left", e.to_string());
        pointer.position(&Position::X, x).map_err(to_error)?;
        pointer.position(&Position::Y, y).map_err(to_error)?;
        pointer.synchronize().map_err(to_error)?;
        pointer.press(&LEFT_BUTTON).map_err(to_error)?;
        pointer.synchronize().map_err(to_error)?;
        pointer.release(&LEFT_BUTTON).map_err(to_error)?;
        pointer.synchronize().map_err(to_error)?;

        debug!("Виртуальный щелчок в ({}, {})", x, y);
        Ok(())
    }

    fn release_all(&self) -> Result<()> {
        let held: Vec<u16> = self.held_keys.iter().map(|code| *code).collect();
        if held.is_empty() {
            return Ok(());
        }

        info!("Отпускаем {} удерживаемых клавиш на '{}'", held.len(), self.device_name);
        self.held_keys.clear();

        if self.dry_run {
            return Ok(());
        }

        if let Some(device) = &self.device {
            let mut device = device.lock();
            for code in held {
                if let Err(e) = device.write(EV_KEY, code as i32, 0) {
                    warn!("Не удалось отпустить клавишу {}: {}", code, e);
                }
            }
            device.write(EV_SYN, 0, 0)?;
        }
        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if !self.dry_run {
            info!("Закрытие виртуального устройства '{}'", self.device_name);
        }
    }
}
