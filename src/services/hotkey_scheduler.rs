use crate::config::{EngineConfig, HotkeySpec};
use crate::debug_if_enabled;
use crate::events::Action;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::info;

/// Запас на обработку действия, добавляемый к каждому интервалу
pub const HOTKEY_EXECUTION_BUFFER: Duration = Duration::from_millis(50);

/// Горячие клавиши, ставшие готовыми за один тик (слотов не больше семи)
pub type DueHotkeys = SmallVec<[Action; 7]>;

#[derive(Debug, Clone)]
struct HotkeyRuntimeState {
    spec: HotkeySpec,
    last_run: Option<Instant>,
    next_run: Instant,
}

impl HotkeyRuntimeState {
    fn is_active(&self) -> bool {
        self.spec.enabled && !self.spec.key.trim().is_empty()
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.spec.interval_secs) + HOTKEY_EXECUTION_BUFFER
    }

    fn rearm(&mut self, now: Instant) {
        self.next_run = now + self.interval();
    }
}

/// Расписание горячих клавиш: у каждого слота свой интервал и время следующего срабатывания
#[derive(Debug, Default)]
pub struct HotkeyScheduler {
    hotkeys: BTreeMap<String, HotkeyRuntimeState>,
}

impl HotkeyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Заменить все слоты; каждый активный слот взводится от `now`
    pub fn load(&mut self, specs: &BTreeMap<String, HotkeySpec>, now: Instant) {
        self.hotkeys = specs
            .iter()
            .map(|(id, spec)| {
                let mut state = HotkeyRuntimeState {
                    spec: spec.clone(),
                    last_run: None,
                    next_run: now,
                };
                state.rearm(now);
                (id.clone(), state)
            })
            .collect();

        let active = self.hotkeys.values().filter(|s| s.is_active()).count();
        info!("Загружено горячих клавиш: {} (активных: {})", self.hotkeys.len(), active);
    }

    /// Горячие клавиши, готовые к срабатыванию, в порядке слотов; сработавшие сразу перевзводятся
    pub fn due_hotkeys(&mut self, now: Instant) -> DueHotkeys {
        let mut due = DueHotkeys::new();

        for (id, state) in self.hotkeys.iter_mut() {
            if !state.is_active() || now < state.next_run {
                continue;
            }

            due.push(Action::press(
                id.as_str(),
                state.spec.key.as_str(),
                state.spec.press_duration_ms,
                now,
            ));
            state.last_run = Some(now);
            state.rearm(now);
            debug_if_enabled!("Горячая клавиша {} готова, следующая через {:?}", id, state.interval());
        }

        due
    }

    /// Включить или выключить слот; включённый слот взводится от `now`
    pub fn set_enabled(&mut self, id: &str, enabled: bool, now: Instant) -> bool {
        let Some(state) = self.hotkeys.get_mut(id) else {
            return false;
        };
        state.spec.enabled = enabled;
        if enabled {
            state.rearm(now);
        }
        true
    }

    /// Перевзвести все таймеры, чтобы устаревшие сроки прошлого запуска не сработали сразу
    pub fn reset_all_timers(&mut self, now: Instant) {
        for state in self.hotkeys.values_mut().filter(|s| s.is_active()) {
            state.rearm(now);
        }
    }

    #[cfg(test)]
    pub fn next_run(&self, id: &str) -> Option<Instant> {
        self.hotkeys.get(id).map(|s| s.next_run)
    }

    #[cfg(test)]
    pub fn last_run(&self, id: &str) -> Option<Instant> {
        self.hotkeys.get(id).and_then(|s| s.last_run)
    }

    pub fn active_count(&self) -> usize {
        self.hotkeys.values().filter(|s| s.is_active()).count()
    }
}

/// Длительность блокировки основного цикла после пачки из `due_count` горячих клавиш
pub fn block_duration(due_count: usize, settings: &EngineConfig) -> Duration {
    if due_count == 0 {
        return Duration::ZERO;
    }
    let max_burst = settings.max_consecutive_hotkeys.max(1) as u64;
    let extra = (due_count as u64 - 1).min(max_burst - 1);
    let block_ms = settings.base_block_ms + extra * settings.extra_block_per_hotkey_ms;
    Duration::from_millis(block_ms.min(settings.max_block_ms))
}
