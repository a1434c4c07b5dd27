use crate::config::{EngineConfig, HotkeySpec, MainLoopSpec};
use crate::debug_if_enabled;
use crate::events::{Action, EngineState, EventBus};
use crate::services::action_queue::ActionQueue;
use crate::services::focus_tracker::WindowFocusTracker;
use crate::services::hotkey_scheduler::{block_duration, DueHotkeys, HotkeyScheduler};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const COMPONENT: &str = "MACRO";
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const MAIN_ACTION_ID: &str = "MAIN";

/// Состояние планирования; принадлежит только циклу движка
struct LoopState {
    block_until: Option<Instant>,
    consecutive_hotkeys: u32,
    last_hotkey: Instant,
    last_main: Instant,
    focus_lost: bool,
}

impl LoopState {
    fn new(now: Instant) -> Self {
        Self {
            block_until: None,
            consecutive_hotkeys: 0,
            last_hotkey: now,
            last_main: now,
            focus_lost: false,
        }
    }

    fn unblock(&mut self) {
        self.block_until = None;
        self.consecutive_hotkeys = 0;
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Основной планировщик: горячие клавиши с приоритетом и блокировкой, затем основная клавиша.
///
/// Ни одно действие не ставится в очередь, пока окно игры не в фокусе.
pub struct ExecutionEngine {
    settings: EngineConfig,
    main_loop: MainLoopSpec,
    scheduler: Mutex<HotkeyScheduler>,
    queue: Arc<ActionQueue>,
    focus: Arc<WindowFocusTracker>,
    bus: Arc<EventBus>,
    state: watch::Sender<EngineState>,
    running: Mutex<Option<RunningLoop>>,
}

impl ExecutionEngine {
    pub fn new(
        settings: EngineConfig,
        main_loop: MainLoopSpec,
        hotkeys: &BTreeMap<String, HotkeySpec>,
        queue: Arc<ActionQueue>,
        focus: Arc<WindowFocusTracker>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let mut scheduler = HotkeyScheduler::new();
        scheduler.load(hotkeys, Instant::now());

        Arc::new(Self {
            settings,
            main_loop,
            scheduler: Mutex::new(scheduler),
            queue,
            focus,
            bus,
            state: watch::Sender::new(EngineState::Stopped),
            running: Mutex::new(None),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    #[cfg(test)]
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() != EngineState::Stopped
    }

    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    /// Запустить цикл планирования. Возвращает `false`, если движок уже работает.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let now = Instant::now();
        self.scheduler.lock().reset_all_timers(now);
        self.queue.start();
        self.state.send_replace(EngineState::Running);

        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move { engine.run_loop(loop_cancel).await });

        *running = Some(RunningLoop { cancel, handle });
        self.bus.log(COMPONENT, "🚀 Макрос запущен");
        true
    }

    /// Остановить цикл и сбросить недоделанные действия. Повторный вызов ничего не делает.
    ///
    /// Воркер очереди продолжает работать: через него идёт удалённый ввод и при остановленном макросе.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        self.bus.log(COMPONENT, "🛑 Остановка макроса...");
        self.state.send_replace(EngineState::Stopped);
        running.cancel.cancel();
        self.queue.clear();

        let abort = running.handle.abort_handle();
        if timeout(STOP_JOIN_TIMEOUT, running.handle).await.is_err() {
            warn!("Цикл планирования не завершился за {:?}, прерываем", STOP_JOIN_TIMEOUT);
            abort.abort();
        }
        self.bus.log(COMPONENT, "✅ Макрос остановлен");
    }

    /// Поставить на паузу; очередь не очищается, начатые действия завершатся
    pub fn pause(&self, reason: &str) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == EngineState::Running {
                *state = EngineState::Paused;
                true
            } else {
                false
            }
        });
        if changed {
            self.bus.log(COMPONENT, format!("⏸️ Пауза: {}", reason));
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == EngineState::Paused {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        });
        if changed {
            self.bus.log(COMPONENT, "▶️ Продолжаем");
        }
        changed
    }

    pub fn toggle_pause(&self) -> bool {
        match self.state() {
            EngineState::Paused => self.resume(),
            EngineState::Running => self.pause("переключение вручную"),
            EngineState::Stopped => false,
        }
    }

    /// Перезагрузить горячие клавиши; допустимо на ходу
    pub fn reload_hotkeys(&self, specs: &BTreeMap<String, HotkeySpec>) {
        self.scheduler.lock().load(specs, Instant::now());
        self.bus.log(COMPONENT, "✅ Горячие клавиши перезагружены");
    }

    pub fn set_hotkey_enabled(&self, id: &str, enabled: bool) -> bool {
        let found = self.scheduler.lock().set_enabled(id, enabled, Instant::now());
        if found {
            let verb = if enabled { "включена" } else { "выключена" };
            self.bus.log(COMPONENT, format!("Горячая клавиша {} {}", id, verb));
        }
        found
    }

    pub fn active_hotkeys(&self) -> usize {
        self.scheduler.lock().active_count()
    }

    /// Спать, пока не отменят; `false` означает отмену
    async fn idle(cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let settings = &self.settings;
        let tick = Duration::from_millis(settings.tick_ms);
        let mut st = LoopState::new(Instant::now());

        debug_if_enabled!("Цикл планирования запущен");

        while !cancel.is_cancelled() {
            if self.state() == EngineState::Paused {
                if !Self::idle(&cancel, Duration::from_millis(settings.paused_sleep_ms)).await {
                    break;
                }
                continue;
            }

            if !self.focus.is_target_focused().await {
                // Ввод в чужое окно недопустим: всё несделанное выбрасывается
                self.queue.clear();
                st.unblock();
                if !st.focus_lost {
                    st.focus_lost = true;
                    self.bus.log(COMPONENT, "🔍 Окно игры не в фокусе, действия приостановлены");
                }
                if !Self::idle(&cancel, Duration::from_millis(settings.unfocused_sleep_ms)).await {
                    break;
                }
                continue;
            }
            if st.focus_lost {
                st.focus_lost = false;
                self.bus.log(COMPONENT, "🎮 Окно игры снова в фокусе");
            }

            let now = Instant::now();

            if let Some(until) = st.block_until {
                if now < until {
                    let wait = (until - now).min(Duration::from_millis(settings.block_poll_cap_ms));
                    if !Self::idle(&cancel, wait).await {
                        break;
                    }
                    continue;
                }
                st.unblock();
                debug_if_enabled!("🔓 Основной цикл разблокирован");
            }

            let due = self.scheduler.lock().due_hotkeys(now);
            if !due.is_empty() {
                self.queue_hotkeys(due, now, &mut st);
                // Горячие клавиши вытесняют основную клавишу в этом тике
                continue;
            }

            let recent = Duration::from_millis(settings.hotkey_recent_window_ms);
            if st.consecutive_hotkeys == 0 || now.duration_since(st.last_hotkey) > recent {
                self.process_main_loop(now, &mut st);
            }

            if !Self::idle(&cancel, tick).await {
                break;
            }
        }

        debug_if_enabled!("Цикл планирования завершён");
    }

    fn queue_hotkeys(&self, due: DueHotkeys, now: Instant, st: &mut LoopState) {
        let count = due.len();
        let block = block_duration(count, &self.settings);
        if block.is_zero() {
            // Блокировка выключена, основной цикл сдерживают только окно недавних горячих клавиш и пауза после них
            self.bus.log(COMPONENT, format!("🎯 Готово горячих клавиш: {}", count));
        } else {
            st.block_until = Some(now + block);
            self.bus.log(
                COMPONENT,
                format!("🎯 Готово горячих клавиш: {}, основной цикл заблокирован на {}мс", count, block.as_millis()),
            );
        }

        let min_gap = Duration::from_millis(self.settings.min_hotkey_gap_ms);
        let mut slot = now;
        for (i, mut action) in due.into_iter().enumerate() {
            if i > 0 {
                slot += min_gap + Duration::from_millis(action.duration_ms);
                let wait = slot.saturating_duration_since(Instant::now());
                if !wait.is_zero() {
                    debug_if_enabled!("⏳ {} будет ждать {}мс", action.id, wait.as_millis());
                }
            }
            // Фактическую паузу между нажатиями обеспечивает воркер очереди
            action.due_time = slot;
            debug_if_enabled!("🔥 В очередь: {}", action);
            self.queue.enqueue_press(action);
        }

        st.consecutive_hotkeys = (st.consecutive_hotkeys + count as u32).min(self.settings.max_consecutive_hotkeys);
        st.last_hotkey = now;
    }

    fn process_main_loop(&self, now: Instant, st: &mut LoopState) {
        let main = &self.main_loop;
        if !main.is_configured() {
            return;
        }

        if now.duration_since(st.last_main) < Duration::from_millis(main.interval_ms) {
            return;
        }

        let depth = self.queue.queue_depth();
        if depth > 0 {
            debug_if_enabled!("⏸️ Основной цикл ждёт: в очереди {} действий", depth);
            return;
        }

        let since_hotkey = now.duration_since(st.last_hotkey);
        let settle = Duration::from_millis(self.settings.main_settle_gap_ms);
        if since_hotkey < settle {
            debug_if_enabled!("⏳ Основной цикл ждёт {}мс после горячих клавиш", (settle - since_hotkey).as_millis());
            return;
        }

        self.queue
            .enqueue_press(Action::press(MAIN_ACTION_ID, main.key.as_str(), main.press_duration_ms, now));
        st.last_main = now;
        st.consecutive_hotkeys = 0;
        debug_if_enabled!("🔁 Основная клавиша в очереди");
    }
}
