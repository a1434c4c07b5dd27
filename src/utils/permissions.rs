use crate::error::{AutomacroError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{info, warn};

/// Проверить доступ к устройствам ввода перед запуском.
///
/// `/dev/uinput` нужен всегда, `/dev/input` только для клавиш управления.
pub fn check_permissions(control_keys: bool) -> Result<()> {
    info!("Проверка прав доступа...");

    check_uinput_access()?;
    if control_keys {
        check_input_devices_access()?;
    }
    check_not_root();

    info!("Проверка прав доступа завершена");
    Ok(())
}

fn check_input_devices_access() -> Result<()> {
    let input_dir = "/dev/input";

    match fs::read_dir(input_dir) {
        Ok(_) => {
            info!("Доступ к {} подтверждён", input_dir);
            Ok(())
        }
        Err(e) => Err(AutomacroError::Permission(format!(
            "Нет доступа к {}: {}. Добавьте пользователя в группу 'input'",
            input_dir, e
        ))),
    }
}

fn check_uinput_access() -> Result<()> {
    let uinput_device = Path::new("/dev/uinput");

    if !uinput_device.exists() {
        // Модуль может быть загружен позже, создание устройства покажет реальную ошибку
        warn!("{:?} не существует, возможно модуль uinput не загружен (sudo modprobe uinput)", uinput_device);
        return Ok(());
    }

    let metadata = fs::metadata(uinput_device).map_err(|e| {
        AutomacroError::Permission(format!("Не удалось проверить права доступа к {:?}: {}", uinput_device, e))
    })?;

    let mode = metadata.permissions().mode();
    if !uinput_mode_allows_access(mode) && !is_root() {
        return Err(AutomacroError::Permission(format!(
            "Нет прав доступа к {:?}. Добавьте пользователя в группу 'uinput' или 'input'",
            uinput_device
        )));
    }

    info!("Доступ к {:?} подтверждён", uinput_device);
    Ok(())
}

/// Доступ через группу или для всех (обычно 660 или 666)
fn uinput_mode_allows_access(mode: u32) -> bool {
    mode & 0o066 != 0
}

fn is_root() -> bool {
    std::env::var("USER").is_ok_and(|user| user == "root")
}

fn check_not_root() {
    if is_root() {
        warn!("⚠️  Приложение запущено от имени root!");
        warn!("   Окна игры ищутся в сессии пользователя, под sudo используется $SUDO_USER");
        warn!("   Лучше добавить пользователя в группы: sudo usermod -a -G input,uinput $USER");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uinput_mode() {
        assert!(uinput_mode_allows_access(0o660));
        assert!(uinput_mode_allows_access(0o666));
        assert!(!uinput_mode_allows_access(0o600));
    }
}
