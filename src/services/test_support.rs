//! Фейковые реализации внешних возможностей для модульных тестов

use crate::config::{EngineConfig, InjectorConfig, MainLoopSpec, MessagesConfig, TimingConfig};
use crate::error::{AutomacroError, Result};
use crate::events::{AlertKind, DetectionResult, EventBus, ProcessTarget, WindowGeometry, WindowHandle};
use crate::services::action_queue::ActionQueue;
use crate::services::coordinator::Coordinator;
use crate::services::detection::StateDetector;
use crate::services::execution_engine::ExecutionEngine;
use crate::services::focus_tracker::WindowFocusTracker;
use crate::services::injector::KeyInjector;
use crate::services::monitoring::MonitoringLoop;
use crate::services::notifier::Notifier;
use crate::services::window_locator::WindowLocator;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub at: Instant,
    pub key: String,
    pub down: bool,
}

/// Запоминает все нажатия и отпускания с моментом (виртуального) времени
#[derive(Default)]
pub struct RecordingInjector {
    events: Mutex<Vec<KeyEvent>>,
    clicks: Mutex<Vec<(i32, i32)>>,
    fail_keys: Mutex<Vec<String>>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().push(key.to_string());
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.events.lock().clone()
    }

    /// Координаты щелчков в порядке выполнения
    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().clone()
    }

    pub fn downs(&self, key: &str) -> Vec<Instant> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.down && e.key == key)
            .map(|e| e.at)
            .collect()
    }

    fn record(&self, key: &str, down: bool) -> Result<()> {
        if self.fail_keys.lock().iter().any(|k| k == key) {
            return Err(AutomacroError::injection(key, "тестовый сбой"));
        }
        self.events.lock().push(KeyEvent {
            at: Instant::now(),
            key: key.to_string(),
            down,
        });
        Ok(())
    }
}

impl KeyInjector for RecordingInjector {
    fn key_down(&self, key: &str) -> Result<()> {
        self.record(key, true)
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.record(key, false)
    }

    fn click(&self, x: i32, y: i32) -> Result<()> {
        self.record("mouse_left", true)?;
        self.record("mouse_left", false)?;
        self.clicks.lock().push((x, y));
        Ok(())
    }
}

/// Управляемое тестом окно игры
pub struct FakeLocator {
    pub running: AtomicBool,
    pub focused: AtomicBool,
    pub raised: AtomicUsize,
    handle: WindowHandle,
}

impl FakeLocator {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            focused: AtomicBool::new(true),
            raised: AtomicUsize::new(0),
            handle: WindowHandle::new("0x1", 4242),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl WindowLocator for FakeLocator {
    async fn find_process(&self, _target: &ProcessTarget) -> Result<Option<u32>> {
        Ok(self.running.load(Ordering::SeqCst).then_some(self.handle.pid))
    }

    async fn find_process_window(&self, _target: &ProcessTarget) -> Result<Option<WindowHandle>> {
        Ok(self.running.load(Ordering::SeqCst).then(|| self.handle.clone()))
    }

    async fn is_focused(&self, _handle: &WindowHandle) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst) && self.focused.load(Ordering::SeqCst))
    }

    async fn bring_to_front(&self, _handle: &WindowHandle) -> Result<bool> {
        self.raised.fetch_add(1, Ordering::SeqCst);
        self.focused.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn window_geometry(&self, _handle: &WindowHandle) -> Result<Option<WindowGeometry>> {
        Ok(Some(WindowGeometry {
            x: 100,
            y: 40,
            width: 1920,
            height: 1080,
        }))
    }
}

/// Отдаёт результаты по очереди; когда очередь пуста, повторяет последний
pub struct ScriptedDetector {
    script: Mutex<VecDeque<DetectionResult>>,
    last: Mutex<DetectionResult>,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = DetectionResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(DetectionResult::detected(false, true)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: DetectionResult) {
        self.script.lock().push_back(result);
    }
}

#[async_trait::async_trait]
impl StateDetector for ScriptedDetector {
    async fn check_state(&self, _handle: &WindowHandle) -> DetectionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(AlertKind, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(AlertKind, String)> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.sent.lock().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, kind: AlertKind, context: &str) {
        self.sent.lock().push((kind, context.to_string()));
    }
}

/// Настройки инжектора без случайного разброса удержания
pub fn injector_settings() -> InjectorConfig {
    InjectorConfig {
        min_key_gap_ms: 200,
        press_jitter_ms: 0,
    }
}

pub fn engine_settings() -> EngineConfig {
    EngineConfig::default()
}

pub fn timing_settings() -> TimingConfig {
    TimingConfig::default()
}

pub fn target() -> ProcessTarget {
    ProcessTarget::new("MapleStory.exe")
}

/// Координатор поверх фейков: окно найдено и в фокусе, состояние игры в норме
pub fn coordinator(locator: Arc<FakeLocator>) -> Arc<Coordinator> {
    let bus = Arc::new(EventBus::new());
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
        locator,
        Arc::new(ScriptedDetector::new([])),
        Arc::new(RecordingNotifier::new()),
        bus.clone(),
    );
    Coordinator::new(engine, monitoring, focus, bus, &timing_settings(), MessagesConfig::default())
}
