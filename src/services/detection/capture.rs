use crate::automacro_error;
use crate::config::WindowConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{Region, WindowHandle};
use crate::services::window_locator::WindowLocator;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Захват прямоугольной области окна
#[async_trait::async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Область задаётся относительно окна. `Ok(None)` - захват не удался, но это не ошибка.
    async fn capture_region(&self, handle: &WindowHandle, region: Region) -> Result<Option<DynamicImage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMethod {
    /// ImageMagick `import`, X11
    Import,
    /// `grim`, wlroots-композиторы
    Grim,
}

/// Захват через внешнюю утилиту с PNG в stdout
pub struct CommandCapturer {
    method: CaptureMethod,
    locator: Arc<dyn WindowLocator>,
}

impl CommandCapturer {
    fn new(method: CaptureMethod, locator: Arc<dyn WindowLocator>) -> Self {
        Self { method, locator }
    }

    async fn command(&self, handle: &WindowHandle, region: Region) -> Result<Option<Command>> {
        let cmd = match self.method {
            CaptureMethod::Import => {
                let mut cmd = Command::new("import");
                cmd.args(["-window", handle.id.as_str(), "-crop", region.to_string().as_str(), "png:-"]);
                cmd
            }
            CaptureMethod::Grim => {
                // grim работает в координатах экрана
                let Some(geometry) = self.locator.window_geometry(handle).await? else {
                    debug_if_enabled!("Геометрия окна {} неизвестна", handle);
                    return Ok(None);
                };
                let abs = region.offset_by(&geometry);
                let mut cmd = Command::new("grim");
                cmd.args([
                    "-g".to_string(),
                    format!("{},{} {}x{}", abs.x1, abs.y1, abs.width(), abs.height()),
                    "-".to_string(),
                ]);
                cmd
            }
        };
        Ok(Some(cmd))
    }
}

#[async_trait::async_trait]
impl ScreenCapturer for CommandCapturer {
    async fn capture_region(&self, handle: &WindowHandle, region: Region) -> Result<Option<DynamicImage>> {
        if region.is_empty() {
            warn!("Пустая область захвата {}", region);
            return Ok(None);
        }

        let Some(mut cmd) = self.command(handle, region).await? else {
            return Ok(None);
        };

        let output = cmd
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| automacro_error!(capture, "{:?} не запускается: {}", self.method, e))?;

        if !output.status.success() {
            debug_if_enabled!(
                "Захват {} окна {} не удался: {}",
                region,
                handle,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        match image::load_from_memory(&output.stdout) {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                warn!("Не удалось декодировать снимок области {}: {}", region, e);
                Ok(None)
            }
        }
    }
}

/// В dry-run снимков нет, детекция всегда "неизвестно"
pub struct DryRunCapturer;

#[async_trait::async_trait]
impl ScreenCapturer for DryRunCapturer {
    async fn capture_region(&self, handle: &WindowHandle, region: Region) -> Result<Option<DynamicImage>> {
        debug_if_enabled!("[DRY RUN] Захват {} окна {}", region, handle);
        Ok(None)
    }
}

/// Factory function to create the screen capturer based on the dry_run flag
pub fn create_screen_capturer(
    config: &WindowConfig,
    locator: Arc<dyn WindowLocator>,
    dry_run: bool,
) -> Arc<dyn ScreenCapturer> {
    if dry_run {
        return Arc::new(DryRunCapturer);
    }

    let method = match config.capture.as_str() {
        "grim" => CaptureMethod::Grim,
        _ => CaptureMethod::Import,
    };
    info!("Захват экрана через {:?}", method);
    Arc::new(CommandCapturer::new(method, locator))
}

/// PNG-кодирование снимка для отправки
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
