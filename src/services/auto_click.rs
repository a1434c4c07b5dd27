use crate::config::AutoClickConfig;
use crate::debug_if_enabled;
use crate::events::{Action, EngineState, EventBus};
use crate::services::detection::RegionTrigger;
use crate::services::execution_engine::ExecutionEngine;
use crate::services::focus_tracker::WindowFocusTracker;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const COMPONENT: &str = "AUTOCLICK";
const ACTION_ID: &str = "AUTOCLICK";

/// Периодически ищет эталон в области окна и щёлкает в заданную точку.
///
/// Работает только пока макрос запущен и не на паузе; щелчок идёт через общую очередь действий.
pub struct AutoClickMonitor {
    period: Duration,
    click_x: i32,
    click_y: i32,
    trigger: Arc<dyn RegionTrigger>,
    engine: Arc<ExecutionEngine>,
    focus: Arc<WindowFocusTracker>,
    bus: Arc<EventBus>,
}

impl AutoClickMonitor {
    pub fn new(
        config: &AutoClickConfig,
        trigger: Arc<dyn RegionTrigger>,
        engine: Arc<ExecutionEngine>,
        focus: Arc<WindowFocusTracker>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            period: config.interval(),
            click_x: config.click_x,
            click_y: config.click_y,
            trigger,
            engine,
            focus,
            bus,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            "🖱️ Автощелчок включён: проверка каждые {:?}, точка ({}, {})",
            self.period, self.click_x, self.click_y
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.check_once().await;
        }

        info!("Автощелчок остановлен");
    }

    /// Одна проверка области; `true`, если щелчок поставлен в очередь
    async fn check_once(&self) -> bool {
        if self.engine.state() != EngineState::Running {
            return false;
        }
        if !self.focus.is_target_focused().await {
            return false;
        }

        let handle = match self.focus.current_handle().await {
            Ok(Some(handle)) => handle,
            Ok(None) => return false,
            Err(e) => {
                debug_if_enabled!("Окно игры недоступно: {}", e);
                return false;
            }
        };

        if !self.trigger.is_triggered(&handle).await {
            return false;
        }

        let geometry = match self.focus.window_geometry().await {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                debug_if_enabled!("Геометрия окна неизвестна, щелчок пропущен");
                return false;
            }
            Err(e) => {
                warn!("Не удалось получить положение окна: {}", e);
                return false;
            }
        };

        let (x, y) = (geometry.x + self.click_x, geometry.y + self.click_y);
        self.engine.queue().enqueue_click(Action::click(ACTION_ID, x, y));
        self.bus.log(COMPONENT, format!("Эталон найден, щелчок в ({}, {})", x, y));
        true
    }
}
