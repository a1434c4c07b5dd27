use crate::config::{HotkeySpec, MessagesConfig, TimingConfig};
use crate::debug_if_enabled;
use crate::events::{AlertKind, EngineState, EventBus, SystemAlert};
use crate::services::execution_engine::ExecutionEngine;
use crate::services::focus_tracker::WindowFocusTracker;
use crate::services::monitoring::MonitoringLoop;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::warn;

const COMPONENT: &str = "SYSTEM";

/// Связывает движок и мониторинг: общий старт и стоп, автоостановка по оповещению.
///
/// Все внешние поверхности (горячие клавиши управления, Telegram, CLI) работают только через него.
pub struct Coordinator {
    engine: Arc<ExecutionEngine>,
    monitoring: Arc<MonitoringLoop>,
    focus: Arc<WindowFocusTracker>,
    bus: Arc<EventBus>,
    messages: MessagesConfig,
    start_settle: Duration,
    running: AtomicBool,
    alert_task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        monitoring: Arc<MonitoringLoop>,
        focus: Arc<WindowFocusTracker>,
        bus: Arc<EventBus>,
        timing: &TimingConfig,
        messages: MessagesConfig,
    ) -> Arc<Self> {
        let alerts = monitoring.take_alerts();

        let coordinator = Arc::new(Self {
            engine,
            monitoring,
            focus,
            bus,
            messages,
            start_settle: Duration::from_millis(timing.start_settle_ms),
            running: AtomicBool::new(false),
            alert_task: Mutex::new(None),
        });

        match alerts {
            Some(mut alerts) => {
                let weak: Weak<Self> = Arc::downgrade(&coordinator);
                let handle = tokio::spawn(async move {
                    while let Some(kind) = alerts.recv().await {
                        let Some(coordinator) = weak.upgrade() else {
                            break;
                        };
                        coordinator.handle_alert(kind).await;
                    }
                });
                *coordinator.alert_task.lock() = Some(handle);
            }
            None => warn!("Канал оповещений мониторинга уже занят, автоостановка отключена"),
        }

        coordinator
    }

    /// Запустить мониторинг, затем (после паузы на стабилизацию) движок.
    ///
    /// Возвращает `false`, если система уже запущена или остановка пришла во время паузы.
    pub async fn start_all(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.bus.log(COMPONENT, "🚀 Запуск системы");
        // Мониторинг мог остаться работать после автоостановки; перезапуск сбрасывает его память
        self.monitoring.stop().await;
        self.monitoring.start();

        sleep(self.start_settle).await;
        if !self.running.load(Ordering::SeqCst) {
            self.bus.log(COMPONENT, "Запуск прерван остановкой");
            return false;
        }

        self.engine.start();
        true
    }

    /// Остановить движок, затем мониторинг. Без запущенной системы ничего не делает.
    pub async fn stop_all(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.engine.stop().await;
        self.monitoring.stop().await;
        self.bus.log(COMPONENT, "🛑 Система остановлена");
        true
    }

    /// Полная остановка при выходе из приложения, независимо от флага запуска
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.engine.stop().await;
        self.monitoring.stop().await;
        if let Some(task) = self.alert_task.lock().take() {
            task.abort();
        }
    }

    async fn handle_alert(&self, kind: AlertKind) {
        // Во время паузы на стабилизацию движок ещё не запущен, но система уже стартует
        let was_active = self.running.swap(false, Ordering::SeqCst) || self.engine.is_running();
        self.engine.stop().await;

        if !was_active {
            debug_if_enabled!("Оповещение {} при остановленном макросе", kind);
            return;
        }

        let message = format!("Macro auto-stopped: {}", kind.message(&self.messages));
        self.bus.log(COMPONENT, format!("🚨 {}", message));
        self.bus.alert(SystemAlert { kind, message });
    }

    pub fn pause_macro(&self, reason: &str) -> bool {
        self.engine.pause(reason)
    }

    pub fn resume_macro(&self) -> bool {
        self.engine.resume()
    }

    pub fn toggle_macro_pause(&self) -> bool {
        self.engine.toggle_pause()
    }

    pub fn reload_hotkeys(&self, specs: &BTreeMap<String, HotkeySpec>) {
        self.engine.reload_hotkeys(specs);
    }

    pub fn set_hotkey_enabled(&self, id: &str, enabled: bool) -> bool {
        self.engine.set_hotkey_enabled(id, enabled)
    }

    pub fn is_macro_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn is_system_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn macro_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Вывести окно игры на передний план; ошибки только логируются
    pub async fn focus_game_window(&self) -> bool {
        match self.focus.bring_to_front().await {
            Ok(raised) => raised,
            Err(e) => {
                warn!("Не удалось активировать окно игры: {}", e);
                false
            }
        }
    }

    /// Краткая сводка для оператора
    pub fn status_summary(&self) -> String {
        format!(
            "Macro: {}\nMonitoring: {}\nTarget: {}\nActive hotkeys: {}\nQueued actions: {}",
            self.engine.state(),
            if self.monitoring.is_running() { "on" } else { "off" },
            self.monitoring.target(),
            self.engine.active_hotkeys(),
            self.engine.queue().queue_depth(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MainLoopSpec;
    use crate::events::DetectionResult;
    use crate::services::action_queue::ActionQueue;
    use crate::services::test_support::{
        engine_settings, injector_settings, target, timing_settings, FakeLocator, RecordingInjector,
        RecordingNotifier, ScriptedDetector,
    };

    struct Harness {
        coordinator: Arc<Coordinator>,
        detector: Arc<ScriptedDetector>,
        locator: Arc<FakeLocator>,
        bus: Arc<EventBus>,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let locator = Arc::new(FakeLocator::new());
        let detector = Arc::new(ScriptedDetector::new([]));
        let queue = Arc::new(ActionQueue::new(Arc::new(RecordingInjector::new()), injector_settings()));
        let focus = Arc::new(WindowFocusTracker::new(locator.clone(), target()));
        let engine = ExecutionEngine::new(
            engine_settings(),
            MainLoopSpec::default(),
            &BTreeMap::new(),
            queue,
            focus.clone(),
            bus.clone(),
        );
        let monitoring = MonitoringLoop::new(
            timing_settings(),
            MessagesConfig::default(),
            target(),
            locator.clone(),
            detector.clone(),
            Arc::new(RecordingNotifier::new()),
            bus.clone(),
        );
        let coordinator = Coordinator::new(engine, monitoring, focus, bus.clone(), &timing_settings(), MessagesConfig::default());
        Harness {
            coordinator,
            detector,
            locator,
            bus,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_start_is_noop() {
        let h = harness();
        assert!(!h.coordinator.stop_all().await);
        assert!(!h.coordinator.is_macro_running());
        assert_eq!(h.coordinator.macro_state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored() {
        let h = harness();
        assert!(h.coordinator.start_all().await);
        assert!(h.coordinator.is_macro_running());
        assert!(!h.coordinator.start_all().await);

        assert!(h.coordinator.stop_all().await);
        assert!(!h.coordinator.is_macro_running());
        assert!(!h.coordinator.is_system_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_settle_cancels_start() {
        let h = harness();
        let (started, stopped) = tokio::join!(h.coordinator.start_all(), async {
            sleep(Duration::from_millis(100)).await;
            h.coordinator.stop_all().await
        });

        assert!(!started);
        assert!(stopped);
        assert!(!h.coordinator.is_macro_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_auto_stops_macro() {
        let h = harness();
        let mut alerts = h.bus.subscribe_alerts();

        assert!(h.coordinator.start_all().await);
        h.detector.push(DetectionResult::detected(true, true));
        sleep(Duration::from_secs(3)).await;

        assert!(!h.coordinator.is_macro_running());
        assert!(!h.coordinator.is_system_running());
        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::PopupDetected);
        assert_eq!(alert.message, "Macro auto-stopped: VM Popup detected in game");

        // После автоостановки систему можно запустить снова
        assert!(h.coordinator.start_all().await);
        assert!(h.coordinator.is_macro_running());
        h.coordinator.shutdown().await;
        assert!(!h.coordinator.is_macro_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_after_auto_stop_is_not_repeated() {
        let h = harness();
        let mut alerts = h.bus.subscribe_alerts();

        assert!(h.coordinator.start_all().await);
        h.coordinator.handle_alert(AlertKind::UiCheckFailed).await;
        assert_eq!(alerts.try_recv().unwrap().kind, AlertKind::UiCheckFailed);

        // Мониторинг продолжает работать, но макрос уже остановлен
        h.coordinator.handle_alert(AlertKind::GameNotRunning).await;
        assert!(alerts.try_recv().is_err());
        assert!(!h.coordinator.is_system_running());
        h.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_during_settle_aborts_start() {
        let h = harness();
        let mut alerts = h.bus.subscribe_alerts();

        let (started, ()) = tokio::join!(h.coordinator.start_all(), async {
            sleep(Duration::from_millis(100)).await;
            h.coordinator.handle_alert(AlertKind::GameNotRunning).await;
        });

        assert!(!started);
        assert!(!h.coordinator.is_macro_running());
        assert_eq!(alerts.try_recv().unwrap().kind, AlertKind::GameNotRunning);
        h.coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_focus_delegate() {
        let h = harness();
        assert!(!h.coordinator.pause_macro("тест"));

        h.coordinator.start_all().await;
        assert!(h.coordinator.toggle_macro_pause());
        assert_eq!(h.coordinator.macro_state(), EngineState::Paused);
        assert!(h.coordinator.resume_macro());

        h.locator.set_focused(false);
        assert!(h.coordinator.focus_game_window().await);
        assert_eq!(h.locator.raised.load(Ordering::SeqCst), 1);

        let summary = h.coordinator.status_summary();
        assert!(summary.contains("Macro: работает"));
        assert!(summary.contains("Monitoring: on"));

        // Перезагрузка слотов на ходу, без остановки движка
        let mut status = h.bus.subscribe_status();
        h.coordinator.reload_hotkeys(&BTreeMap::from([(
            "hotkey1".to_string(),
            HotkeySpec {
                key: "1".to_string(),
                ..HotkeySpec::default()
            },
        )]));
        assert!(h.coordinator.is_macro_running());
        assert!(status.try_recv().unwrap().message.contains("перезагружены"));
        assert!(h.coordinator.status_summary().contains("Active hotkeys: 1"));

        assert!(h.coordinator.set_hotkey_enabled("hotkey1", false));
        assert!(h.coordinator.status_summary().contains("Active hotkeys: 0"));
        assert!(!h.coordinator.set_hotkey_enabled("hotkey9", true));
        h.coordinator.shutdown().await;
    }
}
