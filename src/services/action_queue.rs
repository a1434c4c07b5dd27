use crate::config::InjectorConfig;
use crate::debug_if_enabled;
use crate::events::{Action, ActionKind};
use crate::services::injector::KeyInjector;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    queue: Mutex<VecDeque<Action>>,
    /// Счётчик очисток; меняется под блокировкой очереди
    generation: AtomicU64,
    /// Поступило новое действие (или очередь очищена)
    pending: Notify,
    /// Очередь очищена: текущее удержание нужно прервать
    interrupt: Notify,
    running: AtomicBool,
}

impl Shared {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Следующее действие вместе с номером очистки на момент извлечения
    fn pop(&self) -> Option<(Action, u64)> {
        let mut queue = self.queue.lock();
        queue.pop_front().map(|action| (action, self.generation()))
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// FIFO очередь действий ввода с единственным воркером.
///
/// Через неё идёт весь синтезированный ввод: расписание макроса, удалённые команды и автощелчки.
/// Воркер выдерживает `min_key_gap_ms` между завершением одного действия и началом следующего,
/// независимо от того, кто поставил действие в очередь.
pub struct ActionQueue {
    injector: Arc<dyn KeyInjector>,
    settings: InjectorConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ActionQueue {
    pub fn new(injector: Arc<dyn KeyInjector>, settings: InjectorConfig) -> Self {
        Self {
            injector,
            settings,
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                generation: AtomicU64::new(0),
                pending: Notify::new(),
                interrupt: Notify::new(),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Запустить воркер (повторный вызов без остановки ничего не делает)
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        self.shared.running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(Self::worker_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.injector),
            self.settings.clone(),
            cancel.clone(),
        ));

        *worker = Some(Worker { cancel, handle });
        info!("Очередь действий запущена");
    }

    /// Остановить воркер и очистить очередь; ожидание завершения ограничено по времени
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        self.shared.running.store(false, Ordering::SeqCst);
        worker.cancel.cancel();
        self.clear();

        let abort = worker.handle.abort_handle();
        match timeout(STOP_JOIN_TIMEOUT, worker.handle).await {
            Ok(_) => info!("Очередь действий остановлена"),
            Err(_) => {
                warn!("Воркер очереди не завершился за {:?}, прерываем", STOP_JOIN_TIMEOUT);
                abort.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn enqueue_press(&self, action: Action) {
        self.push(action);
    }

    pub fn enqueue_key_down(&self, key: &str) {
        self.push(Action::key_down("key_down", key));
    }

    pub fn enqueue_key_up(&self, key: &str) {
        self.push(Action::key_up("key_up", key));
    }

    pub fn enqueue_click(&self, action: Action) {
        self.push(action);
    }

    fn push(&self, action: Action) {
        if !self.is_running() {
            debug_if_enabled!("Очередь остановлена, действие {} отброшено", action);
            return;
        }
        self.shared.queue.lock().push_back(action);
        self.shared.pending.notify_one();
    }

    /// Очистить очередь и прервать удержание текущего нажатия.
    ///
    /// Отпускание прерванного нажатия отправляется всегда, клавиши из `Down` без парного `Up` воркер отпускает сам.
    pub fn clear(&self) {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            let dropped = queue.len();
            queue.clear();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            dropped
        };
        self.shared.interrupt.notify_waiters();
        self.shared.pending.notify_one();
        if dropped > 0 {
            debug_if_enabled!("Из очереди удалено {} действий", dropped);
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Дождаться действия; `None` - воркер разбужен без нового действия (например, очисткой)
    async fn next_action(shared: &Shared) -> Option<(Action, u64)> {
        if let Some(next) = shared.pop() {
            return Some(next);
        }
        shared.pending.notified().await;
        shared.pop()
    }

    async fn worker_loop(
        shared: Arc<Shared>,
        injector: Arc<dyn KeyInjector>,
        settings: InjectorConfig,
        cancel: CancellationToken,
    ) {
        let min_gap = Duration::from_millis(settings.min_key_gap_ms);
        let mut last_completed: Option<Instant> = None;
        let mut held: Vec<String> = Vec::new();
        let mut seen_generation = shared.generation();

        loop {
            // Пауза выдерживается до извлечения, чтобы clear() успел убрать ещё не начатые действия
            if let Some(last) = last_completed {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep_until(last + min_gap) => {}
                }
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = Self::next_action(&shared) => next,
            };

            let generation = shared.generation();
            if generation != seen_generation {
                seen_generation = generation;
                Self::release_held(injector.as_ref(), &mut held);
            }

            let Some((action, popped_at)) = next else {
                continue;
            };
            if popped_at != generation {
                debug_if_enabled!("Действие {} отменено очисткой очереди", action);
                continue;
            }

            Self::execute(&shared, injector.as_ref(), &settings, &action, popped_at, &cancel, &mut held).await;
            last_completed = Some(Instant::now());
        }

        Self::release_held(injector.as_ref(), &mut held);
        debug_if_enabled!("Воркер очереди действий завершён");
    }

    fn release_held(injector: &dyn KeyInjector, held: &mut Vec<String>) {
        for key in held.drain(..) {
            debug_if_enabled!("Отпускаем '{}' после очистки очереди", key);
            if let Err(e) = injector.key_up(&key) {
                warn!("Не удалось отпустить '{}': {}", key, e);
            }
        }
    }

    async fn execute(
        shared: &Shared,
        injector: &dyn KeyInjector,
        settings: &InjectorConfig,
        action: &Action,
        popped_at: u64,
        cancel: &CancellationToken,
        held: &mut Vec<String>,
    ) {
        debug_if_enabled!("Выполняем {}", action);

        let result = match action.kind {
            ActionKind::Down => injector.key_down(&action.key).map(|()| {
                if !held.contains(&action.key) {
                    held.push(action.key.clone());
                }
            }),
            ActionKind::Up => {
                held.retain(|key| key != &action.key);
                injector.key_up(&action.key)
            }
            ActionKind::Click { x, y } => injector.click(x, y),
            ActionKind::Press => {
                // Подписка до сверки счётчика: очистка между ними не теряется
                let interrupted = shared.interrupt.notified();
                tokio::pin!(interrupted);

                if let Err(e) = injector.key_down(&action.key) {
                    warn!("Действие {} не выполнено: {}", action, e);
                    return;
                }

                if shared.generation() == popped_at {
                    let hold = hold_duration(action.duration_ms, settings.press_jitter_ms);
                    tokio::select! {
                        _ = sleep(hold) => {}
                        _ = cancel.cancelled() => {}
                        _ = &mut interrupted => {
                            debug_if_enabled!("Удержание {} прервано очисткой очереди", action);
                        }
                    }
                } else {
                    debug_if_enabled!("Очередь очищена до начала удержания {}", action);
                }

                // Отпускание отправляется всегда, иначе клавиша залипнет
                injector.key_up(&action.key)
            }
        };

        if let Err(e) = result {
            warn!("Действие {} не выполнено: {}", action, e);
        }
    }
}

/// Длительность удержания с небольшим случайным разбросом
fn hold_duration(duration_ms: u64, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::from_millis(duration_ms);
    }
    let jitter = jitter_ms as i64;
    let offset = rand::rng().random_range(-jitter..=jitter);
    Duration::from_millis((duration_ms as i64 + offset).max(0) as u64)
}
