use crate::error::Result;
use crate::events::{ProcessTarget, WindowGeometry, WindowHandle};
use tracing::info;

use super::r#trait::WindowLocator;

/// Синтетическое окно для dry-run: процесс "запущен", окно всегда в фокусе
pub struct DryRunLocator {
    handle: WindowHandle,
}

impl DryRunLocator {
    pub fn new() -> Self {
        Self {
            handle: WindowHandle::new("dry-run", std::process::id()),
        }
    }
}

#[async_trait::async_trait]
impl WindowLocator for DryRunLocator {
    async fn find_process(&self, _target: &ProcessTarget) -> Result<Option<u32>> {
        Ok(Some(self.handle.pid))
    }

    async fn find_process_window(&self, target: &ProcessTarget) -> Result<Option<WindowHandle>> {
        info!("[DRY RUN] Окно для {} эмулируется", target);
        Ok(Some(self.handle.clone()))
    }

    async fn is_focused(&self, _handle: &WindowHandle) -> Result<bool> {
        Ok(true)
    }

    async fn bring_to_front(&self, handle: &WindowHandle) -> Result<bool> {
        info!("[DRY RUN] Активация окна {}", handle);
        Ok(true)
    }

    async fn window_geometry(&self, _handle: &WindowHandle) -> Result<Option<WindowGeometry>> {
        Ok(Some(WindowGeometry { x: 0, y: 0, width: 1920, height: 1080 }))
    }
}
