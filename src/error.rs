use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomacroError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка uinput: {0}")]
    Uinput(#[from] uinput::Error),

    #[error("Ошибка HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ошибка обработки изображения: {0}")]
    Image(#[from] image::ImageError),

    #[error("Ошибка инъекции клавиши '{key}': {reason}")]
    Injection { key: String, reason: String },

    #[error("Ошибка захвата экрана: {0}")]
    Capture(String),

    #[error("Ошибка поиска окна: {0}")]
    WindowLocator(String),

    #[error("Устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("Недостаточно прав доступа: {0}")]
    Permission(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl AutomacroError {
    pub fn device_not_found<T>(msg: impl Into<String>) -> Result<T> {
        Err(AutomacroError::DeviceNotFound(msg.into()))
    }

    pub fn injection(key: &str, reason: impl Into<String>) -> Self {
        AutomacroError::Injection {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomacroError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! automacro_error {
    (capture, $($arg:tt)*) => {
        $crate::error::AutomacroError::Capture(format!($($arg)*))
    };
    (window, $($arg:tt)*) => {
        $crate::error::AutomacroError::WindowLocator(format!($($arg)*))
    };
    (permission, $($arg:tt)*) => {
        $crate::error::AutomacroError::Permission(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::AutomacroError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AutomacroError::Internal(format!($($arg)*))
    };
}
