use crate::config::{MessagesConfig, TimingConfig};
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{AlertKind, EventBus, ProcessTarget, WindowHandle};
use crate::services::detection::StateDetector;
use crate::services::notifier::Notifier;
use crate::services::window_locator::WindowLocator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const COMPONENT: &str = "MONITOR";
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Память фронтов и время последних оповещений; пишет только цикл мониторинга
#[derive(Debug)]
struct MonitoringState {
    was_game_running: bool,
    was_popup_detected: bool,
    was_ui_detected: bool,
    last_popup_alert: Option<Instant>,
    last_ui_alert: Option<Instant>,
    last_game_alert: Option<Instant>,
}

impl Default for MonitoringState {
    fn default() -> Self {
        Self {
            was_game_running: true,
            was_popup_detected: false,
            was_ui_detected: true,
            last_popup_alert: None,
            last_ui_alert: None,
            last_game_alert: None,
        }
    }
}

fn cooldown_passed(last: Option<Instant>, cooldown: Duration, now: Instant) -> bool {
    last.map_or(true, |t| now.duration_since(t) > cooldown)
}

enum Flow {
    Continue,
    Halt,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Цикл мониторинга: опрашивает состояние игры и поднимает оповещения по фронтам с антиспамом.
///
/// Каждое оповещение уходит в Notifier и в канал, который слушает координатор.
pub struct MonitoringLoop {
    timing: TimingConfig,
    messages: MessagesConfig,
    target: ProcessTarget,
    locator: Arc<dyn WindowLocator>,
    detector: Arc<dyn StateDetector>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
    state: Mutex<MonitoringState>,
    running: AtomicBool,
    task: Mutex<Option<RunningLoop>>,
    alert_tx: mpsc::UnboundedSender<AlertKind>,
    alert_rx: Mutex<Option<mpsc::UnboundedReceiver<AlertKind>>>,
}

impl MonitoringLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timing: TimingConfig,
        messages: MessagesConfig,
        target: ProcessTarget,
        locator: Arc<dyn WindowLocator>,
        detector: Arc<dyn StateDetector>,
        notifier: Arc<dyn Notifier>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            timing,
            messages,
            target,
            locator,
            detector,
            notifier,
            bus,
            state: Mutex::new(MonitoringState::default()),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            alert_tx,
            alert_rx: Mutex::new(Some(alert_rx)),
        })
    }

    /// Канал оповещений; забрать его можно только один раз
    pub fn take_alerts(&self) -> Option<mpsc::UnboundedReceiver<AlertKind>> {
        self.alert_rx.lock().take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn target(&self) -> &ProcessTarget {
        &self.target
    }

    /// Вернуть память UI в нейтральное состояние, чтобы первое пропадание интерфейса не потерялось
    pub fn reset_ui_baseline(&self) {
        let mut state = self.state.lock();
        state.was_ui_detected = true;
        state.last_ui_alert = None;
    }

    /// Запустить мониторинг. Возвращает `false`, если он уже идёт.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if self.running.load(Ordering::SeqCst) {
            return false;
        }
        // Цикл, остановивший себя сам, мог ещё не выйти; его токен уже отменён
        if let Some(previous) = task.take() {
            previous.cancel.cancel();
        }

        {
            let mut state = self.state.lock();
            state.was_game_running = true;
            state.was_popup_detected = false;
        }
        self.reset_ui_baseline();

        let cancel = CancellationToken::new();
        let monitor = Arc::clone(self);
        let loop_cancel = cancel.clone();
        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move { monitor.run_loop(loop_cancel).await });

        *task = Some(RunningLoop { cancel, handle });
        self.bus.log(COMPONENT, "🟢 Мониторинг запущен");
        true
    }

    /// Остановить мониторинг снаружи; ожидание ограничено по времени. Повторный вызов безопасен.
    pub async fn stop(&self) {
        let Some(running) = self.task.lock().take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        running.cancel.cancel();

        let abort = running.handle.abort_handle();
        if timeout(STOP_JOIN_TIMEOUT, running.handle).await.is_err() {
            warn!("Цикл мониторинга не завершился за {:?}, прерываем", STOP_JOIN_TIMEOUT);
            abort.abort();
        }
        self.bus.log(COMPONENT, "🔴 Мониторинг остановлен");
    }

    async fn idle(cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let interval = self.timing.detect_interval();
        let backoff = Duration::from_millis(self.timing.error_backoff_ms);

        while !cancel.is_cancelled() {
            let pause = match self.iteration(&cancel).await {
                Ok(Flow::Continue) => interval,
                Ok(Flow::Halt) => break,
                Err(e) => {
                    self.bus.log(COMPONENT, format!("❌ Ошибка мониторинга: {}", e));
                    backoff
                }
            };
            if !Self::idle(&cancel, pause).await {
                break;
            }
        }

        debug_if_enabled!("Цикл мониторинга завершён");
    }

    async fn iteration(&self, cancel: &CancellationToken) -> Result<Flow> {
        if self.locator.find_process(&self.target).await?.is_none() {
            self.handle_game_not_running();
            return Ok(Flow::Continue);
        }

        let Some(handle) = self.locator.find_process_window(&self.target).await? else {
            debug_if_enabled!("Процесс {} есть, но окно не найдено", self.target);
            return Ok(Flow::Continue);
        };

        Ok(self.handle_game_running(&handle, cancel).await)
    }

    fn handle_game_not_running(&self) {
        let now = Instant::now();
        let cooldown = Duration::from_secs(self.timing.ui_check_cooldown_secs);

        let raise = {
            let mut state = self.state.lock();
            let raise = state.was_game_running && cooldown_passed(state.last_game_alert, cooldown, now);
            if raise {
                state.last_game_alert = Some(now);
            }
            if state.was_game_running {
                self.bus.log(COMPONENT, "🔴 Игра не запущена");
            }
            state.was_game_running = false;
            state.was_ui_detected = false;
            raise
        };

        if raise {
            self.raise(AlertKind::GameNotRunning);
        }
    }

    async fn handle_game_running(&self, handle: &WindowHandle, cancel: &CancellationToken) -> Flow {
        let result = self.detector.check_state(handle).await;
        if !result.success {
            self.bus.log(COMPONENT, "⚠️ Не удалось проверить состояние игры");
            return Flow::Continue;
        }

        let now = Instant::now();
        let (popup_edge, popup_alert, ui_edge) = {
            let mut state = self.state.lock();
            let popup_edge = result.popup_detected && !state.was_popup_detected;
            let popup_alert = popup_edge
                && cooldown_passed(
                    state.last_popup_alert,
                    Duration::from_secs(self.timing.detect_cooldown_secs),
                    now,
                );
            if popup_alert {
                state.last_popup_alert = Some(now);
            }
            state.was_popup_detected = result.popup_detected;
            state.was_game_running = true;
            (popup_edge, popup_alert, !result.ui_detected && state.was_ui_detected)
        };

        if popup_edge {
            self.bus.log(COMPONENT, self.messages.popup_detected.clone());
        }
        if popup_alert {
            self.raise(AlertKind::PopupDetected);
            // Всплывающее окно завершает мониторинг до ручного перезапуска
            self.running.store(false, Ordering::SeqCst);
            self.bus.log(COMPONENT, "🔴 Мониторинг остановлен после всплывающего окна");
            return Flow::Halt;
        }

        if !ui_edge {
            self.state.lock().was_ui_detected = result.ui_detected;
            if result.ui_detected && !result.popup_detected {
                debug_if_enabled!("✅ Игра работает штатно");
            }
            return Flow::Continue;
        }

        self.bus.log(COMPONENT, "⚠️ Интерфейс игры не найден, перепроверка...");
        if !Self::idle(cancel, Duration::from_millis(self.timing.ui_recheck_delay_ms)).await {
            return Flow::Halt;
        }

        let retry = self.detector.check_state(handle).await;
        if !retry.success {
            // Неизвестность не подтверждает сбой; фронт будет оценён заново на следующем опросе
            self.bus.log(COMPONENT, "⚠️ Перепроверка интерфейса не удалась, оповещение не отправлено");
            return Flow::Continue;
        }
        if retry.ui_detected {
            self.state.lock().was_ui_detected = true;
            self.bus.log(COMPONENT, "✅ Ложное срабатывание проверки интерфейса");
            return Flow::Continue;
        }

        let now = Instant::now();
        let raise = {
            let mut state = self.state.lock();
            state.was_ui_detected = false;
            let cooldown = Duration::from_secs(self.timing.ui_check_cooldown_secs);
            let raise = cooldown_passed(state.last_ui_alert, cooldown, now);
            if raise {
                state.last_ui_alert = Some(now);
            }
            raise
        };
        if raise {
            self.raise(AlertKind::UiCheckFailed);
        }
        Flow::Continue
    }

    fn raise(&self, kind: AlertKind) {
        let message = kind.message(&self.messages);
        self.bus.log(COMPONENT, format!("🚨 {}", message));
        self.notifier.send(kind, message);
        if self.alert_tx.send(kind).is_err() {
            debug_if_enabled!("Оповещение {} некому обработать", kind);
        }
    }
}
