use crate::error::Result;
use std::sync::Arc;

use super::virtual_device::VirtualDevice;

/// Примитив синтеза ввода.
///
/// Нажатие с удержанием собирается воркером очереди из `key_down` + пауза + `key_up`,
/// поэтому реализации предоставляют только половинки.
pub trait KeyInjector: Send + Sync {
    fn key_down(&self, key: &str) -> Result<()>;

    fn key_up(&self, key: &str) -> Result<()>;

    /// Щелчок левой кнопкой в абсолютных координатах экрана
    fn click(&self, x: i32, y: i32) -> Result<()>;

    /// Отпустить все удерживаемые клавиши (при остановке)
    fn release_all(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory function to create the key injector based on the dry_run flag.
///
/// `pointer` - разрешение экрана, если нужен виртуальный указатель для щелчков.
pub fn create_key_injector(dry_run: bool, pointer: Option<(u32, u32)>) -> Result<Arc<dyn KeyInjector>> {
    let device = VirtualDevice::new("Automacro Virtual Keyboard", dry_run)?;
    let device = match pointer {
        Some((width, height)) => device.with_pointer(width, height)?,
        None => device,
    };
    Ok(Arc::new(device))
}
