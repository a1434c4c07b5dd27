use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{ProcessTarget, WindowGeometry, WindowHandle};
use crate::services::window_locator::WindowLocator;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

/// Через сколько времени без фокуса повторно искать окно (игра могла перезапуститься)
const STALE_HANDLE_AFTER: Duration = Duration::from_secs(5);

struct CachedWindow {
    handle: WindowHandle,
    resolved_at: Instant,
}

/// Отслеживание фокуса окна игры с кешированием дескриптора
pub struct WindowFocusTracker {
    locator: Arc<dyn WindowLocator>,
    target: ProcessTarget,
    cached: RwLock<Option<CachedWindow>>,
}

impl WindowFocusTracker {
    pub fn new(locator: Arc<dyn WindowLocator>, target: ProcessTarget) -> Self {
        Self {
            locator,
            target,
            cached: RwLock::new(None),
        }
    }

    /// Дескриптор окна игры; при промахе кеша ищется заново
    pub async fn current_handle(&self) -> Result<Option<WindowHandle>> {
        if let Some(cached) = self.cached.read().as_ref() {
            return Ok(Some(cached.handle.clone()));
        }

        let handle = self.locator.find_process_window(&self.target).await?;
        if let Some(handle) = &handle {
            debug_if_enabled!("Окно игры найдено: {}", handle);
            *self.cached.write() = Some(CachedWindow {
                handle: handle.clone(),
                resolved_at: Instant::now(),
            });
        }
        Ok(handle)
    }

    /// Сбросить кешированный дескриптор
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Есть ли у окна игры фокус ввода прямо сейчас.
    ///
    /// Любая ошибка трактуется как "нет фокуса": ввод в чужое окно хуже пропущенного нажатия.
    pub async fn is_target_focused(&self) -> bool {
        let handle = match self.current_handle().await {
            Ok(Some(handle)) => handle,
            Ok(None) => return false,
            Err(e) => {
                debug_if_enabled!("Не удалось найти окно игры: {}", e);
                return false;
            }
        };

        match self.locator.is_focused(&handle).await {
            Ok(true) => true,
            Ok(false) => {
                let stale = self
                    .cached
                    .read()
                    .as_ref()
                    .is_some_and(|c| c.resolved_at.elapsed() >= STALE_HANDLE_AFTER);
                if stale {
                    self.invalidate();
                }
                false
            }
            Err(e) => {
                debug_if_enabled!("Проверка фокуса не удалась: {}", e);
                self.invalidate();
                false
            }
        }
    }

    /// Положение окна игры на экране
    pub async fn window_geometry(&self) -> Result<Option<WindowGeometry>> {
        match self.current_handle().await? {
            Some(handle) => self.locator.window_geometry(&handle).await,
            None => Ok(None),
        }
    }

    /// Вывести окно игры на передний план
    pub async fn bring_to_front(&self) -> Result<bool> {
        let Some(handle) = self.current_handle().await? else {
            warn!("Окно {} не найдено, активировать нечего", self.target);
            return Ok(false);
        };

        let raised = self.locator.bring_to_front(&handle).await?;
        if raised {
            info!("Окно игры {} выведено на передний план", handle);
        } else {
            // Дескриптор мог устареть
            self.invalidate();
            warn!("Не удалось активировать окно {}", handle);
        }
        Ok(raised)
    }
}
