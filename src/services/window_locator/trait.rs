use crate::config::WindowConfig;
use crate::error::Result;
use crate::events::{ProcessTarget, WindowGeometry, WindowHandle};
use std::sync::Arc;
use tracing::info;

use super::dry_run::DryRunLocator;
use super::tool::{Tool, ToolLocator};

/// Поиск окна целевого процесса и работа с фокусом
#[async_trait::async_trait]
pub trait WindowLocator: Send + Sync {
    /// PID целевого процесса, если он запущен
    async fn find_process(&self, target: &ProcessTarget) -> Result<Option<u32>>;

    /// Главное окно целевого процесса
    async fn find_process_window(&self, target: &ProcessTarget) -> Result<Option<WindowHandle>>;

    /// Владеет ли окно (или его процесс) фокусом ввода
    async fn is_focused(&self, handle: &WindowHandle) -> Result<bool>;

    /// Попытаться вывести окно на передний план
    async fn bring_to_front(&self, handle: &WindowHandle) -> Result<bool>;

    /// Абсолютная геометрия окна на экране
    async fn window_geometry(&self, handle: &WindowHandle) -> Result<Option<WindowGeometry>>;
}

/// Factory function to create an appropriate window locator based on the dry_run flag
pub async fn create_window_locator(config: &WindowConfig, dry_run: bool) -> Result<Arc<dyn WindowLocator>> {
    if dry_run {
        return Ok(Arc::new(DryRunLocator::new()));
    }

    let tool = match config.backend.as_str() {
        "xdotool" => Tool::Xdotool,
        "kdotool" => Tool::Kdotool,
        _ => Tool::detect().await?,
    };
    info!("Поиск окон через {}", tool);

    Ok(Arc::new(ToolLocator::new(tool)))
}
