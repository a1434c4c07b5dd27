use crate::automacro_error;
use crate::error::Result;
use crate::events::Action;
use crate::mappings::KeyNames;
use crate::services::action_queue::ActionQueue;
use crate::services::focus_tracker::WindowFocusTracker;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

const SENDER_ID: &str = "TELEGRAM";
const DEFAULT_PRESS_MS: u64 = 100;
const MAX_REPEAT: usize = 50;

/// Одно нажатие удалённой команды
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keystroke {
    Press(String),
    /// Заглавная буква: Shift зажат на время нажатия
    Shifted(String),
}

/// Разобрать `"<key> [count]"` в последовательность нажатий
pub fn parse_key_spec(spec: &str) -> Result<Vec<Keystroke>> {
    let mut parts = spec.split_whitespace();
    let Some(key) = parts.next() else {
        return Err(automacro_error!(internal, "пустое имя клавиши"));
    };

    let count = match parts.next() {
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n.min(MAX_REPEAT),
            _ => return Err(automacro_error!(internal, "неверное число повторов '{}'", raw)),
        },
        None => 1,
    };
    if parts.next().is_some() {
        return Err(automacro_error!(internal, "лишние аргументы в '{}'", spec));
    }

    let stroke = keystroke_for_key(key)?;
    Ok(vec![stroke; count])
}

fn keystroke_for_key(key: &str) -> Result<Keystroke> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_uppercase() {
            return Ok(Keystroke::Shifted(c.to_ascii_lowercase().to_string()));
        }
    }

    if KeyNames::is_known(key) {
        Ok(Keystroke::Press(key.to_lowercase()))
    } else {
        Err(automacro_error!(internal, "неизвестная клавиша '{}'", key))
    }
}

/// Нажатия для набора текста; символы без клавиши пропускаются
pub fn plan_text(text: &str) -> Vec<Keystroke> {
    text.chars()
        .filter_map(|c| {
            let name = match c {
                ' ' => "space".to_string(),
                '\n' => "enter".to_string(),
                '\t' => "tab".to_string(),
                c if c.is_ascii_uppercase() => return Some(Keystroke::Shifted(c.to_ascii_lowercase().to_string())),
                c => c.to_string(),
            };
            if KeyNames::is_known(&name) {
                Some(Keystroke::Press(name))
            } else {
                warn!("Символ {:?} не поддерживается, пропускаем", c);
                None
            }
        })
        .collect()
}

/// Отправка клавиш по удалённой команде.
///
/// Нажатия идут в общую очередь действий вместе с расписанием макроса, поэтому минимальный интервал
/// соблюдается между любыми источниками. Пока окно игры не в фокусе, ввод не ставится.
pub struct KeySender {
    queue: Arc<ActionQueue>,
    focus: Arc<WindowFocusTracker>,
}

impl KeySender {
    pub fn new(queue: Arc<ActionQueue>, focus: Arc<WindowFocusTracker>) -> Self {
        Self { queue, focus }
    }

    /// Вывести окно игры вперёд и убедиться, что фокус у него
    async fn ensure_focus(&self) -> Result<()> {
        if self.focus.is_target_focused().await {
            return Ok(());
        }
        if let Err(e) = self.focus.bring_to_front().await {
            warn!("Не удалось активировать окно игры: {}", e);
        }
        if self.focus.is_target_focused().await {
            Ok(())
        } else {
            Err(automacro_error!(window, "окно игры не в фокусе, ввод отклонён"))
        }
    }

    fn enqueue(&self, strokes: &[Keystroke], duration_ms: u64) {
        for stroke in strokes {
            match stroke {
                Keystroke::Press(key) => {
                    self.queue
                        .enqueue_press(Action::press(SENDER_ID, key.as_str(), duration_ms, Instant::now()));
                }
                Keystroke::Shifted(key) => {
                    self.queue.enqueue_key_down("shift");
                    self.queue
                        .enqueue_press(Action::press(SENDER_ID, key.as_str(), duration_ms, Instant::now()));
                    self.queue.enqueue_key_up("shift");
                }
            }
        }
    }

    /// Отправить `"<key> [count]"`; возвращает число поставленных нажатий
    pub async fn send_key(&self, spec: &str, duration_ms: Option<u64>) -> Result<usize> {
        let strokes = parse_key_spec(spec)?;
        self.ensure_focus().await?;
        self.enqueue(&strokes, duration_ms.unwrap_or(DEFAULT_PRESS_MS));
        info!("⌨️ Удалённая клавиша '{}' x{}", spec.trim(), strokes.len());
        Ok(strokes.len())
    }

    pub async fn send_text(&self, text: &str) -> Result<usize> {
        let strokes = plan_text(text);
        if strokes.is_empty() {
            return Err(automacro_error!(internal, "в тексте нет поддерживаемых символов"));
        }
        self.ensure_focus().await?;
        self.enqueue(&strokes, DEFAULT_PRESS_MS);
        info!("⌨️ Удалённый текст: {} нажатий", strokes.len());
        Ok(strokes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MainLoopSpec;
    use crate::events::EventBus;
    use crate::services::execution_engine::ExecutionEngine;
    use crate::services::test_support::{engine_settings, injector_settings, target, FakeLocator, RecordingInjector};
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use tokio::time::{sleep, Duration};

    fn press(key: &str) -> Keystroke {
        Keystroke::Press(key.to_string())
    }

    #[test]
    fn test_parse_key_spec() {
        assert_eq!(parse_key_spec("esc").unwrap(), vec![press("esc")]);
        assert_eq!(parse_key_spec("  Enter 3 ").unwrap(), vec![press("enter"); 3]);
        assert_eq!(parse_key_spec("A").unwrap(), vec![Keystroke::Shifted("a".to_string())]);
        assert_eq!(parse_key_spec("a").unwrap(), vec![press("a")]);
        assert_eq!(parse_key_spec("space 500").unwrap().len(), MAX_REPEAT);
    }

    #[test]
    fn test_parse_key_spec_rejects_garbage() {
        assert!(parse_key_spec("").is_err());
        assert!(parse_key_spec("hyper").is_err());
        assert!(parse_key_spec("a 0").is_err());
        assert!(parse_key_spec("a x").is_err());
        assert!(parse_key_spec("a 2 3").is_err());
    }

    #[test]
    fn test_plan_text() {
        let plan = plan_text("Hi 1\n");
        assert_eq!(
            plan,
            vec![
                Keystroke::Shifted("h".to_string()),
                press("i"),
                press("space"),
                press("1"),
                press("enter"),
            ]
        );
        // Символы без клавиши молча выпадают
        assert_eq!(plan_text("a!b"), vec![press("a"), press("b")]);
    }

    struct Harness {
        injector: Arc<RecordingInjector>,
        locator: Arc<FakeLocator>,
        queue: Arc<ActionQueue>,
        focus: Arc<WindowFocusTracker>,
        sender: KeySender,
    }

    fn harness() -> Harness {
        let injector = Arc::new(RecordingInjector::new());
        let locator = Arc::new(FakeLocator::new());
        let queue = Arc::new(ActionQueue::new(injector.clone(), injector_settings()));
        queue.start();
        let focus = Arc::new(WindowFocusTracker::new(locator.clone(), target()));
        let sender = KeySender::new(queue.clone(), focus.clone());
        Harness {
            injector,
            locator,
            queue,
            focus,
            sender,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shifted_letter_wraps_press() {
        let h = harness();

        assert_eq!(h.sender.send_key("Q", Some(20)).await.unwrap(), 1);
        sleep(Duration::from_secs(2)).await;

        let sequence: Vec<(String, bool)> = h.injector.events().into_iter().map(|e| (e.key, e.down)).collect();
        assert_eq!(
            sequence,
            vec![
                ("shift".to_string(), true),
                ("q".to_string(), true),
                ("q".to_string(), false),
                ("shift".to_string(), false),
            ]
        );
        h.queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_are_paced() {
        let h = harness();

        h.sender.send_key("enter 3", None).await.unwrap();
        sleep(Duration::from_secs(3)).await;

        let downs = h.injector.downs("enter");
        assert_eq!(downs.len(), 3);
        for pair in downs.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200 + DEFAULT_PRESS_MS));
        }

        // После остановки очереди новые нажатия отбрасываются
        h.queue.stop().await;
        assert!(h.sender.send_text("abc").await.is_ok());
        assert_eq!(h.queue.queue_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raises_window_before_sending() {
        let h = harness();
        h.locator.set_focused(false);

        assert_eq!(h.sender.send_text("ok").await.unwrap(), 2);
        assert_eq!(h.locator.raised.load(Ordering::SeqCst), 1);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.injector.downs("o").len(), 1);
        h.queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_input_without_game_window() {
        let h = harness();
        h.locator.set_running(false);
        h.focus.invalidate();

        assert!(h.sender.send_key("esc", None).await.is_err());
        assert!(h.sender.send_text("hello").await.is_err());
        assert_eq!(h.queue.queue_depth(), 0);

        sleep(Duration::from_secs(1)).await;
        assert!(h.injector.events().is_empty());
        h.queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shares_min_gap_with_macro_schedule() {
        let h = harness();
        let engine = ExecutionEngine::new(
            engine_settings(),
            MainLoopSpec {
                key: "z".to_string(),
                interval_ms: 300,
                press_duration_ms: 100,
            },
            &BTreeMap::new(),
            h.queue.clone(),
            h.focus.clone(),
            Arc::new(EventBus::new()),
        );
        engine.start();

        sleep(Duration::from_millis(300)).await;
        h.sender.send_key("esc 2", None).await.unwrap();
        sleep(Duration::from_secs(3)).await;
        engine.stop().await;

        let events = h.injector.events();
        assert_eq!(h.injector.downs("esc").len(), 2);
        assert!(!h.injector.downs("z").is_empty());
        // Каждое нажатие начинается не раньше чем через 200мс после отпускания предыдущего
        for (i, event) in events.iter().enumerate().skip(1).filter(|(_, e)| e.down) {
            let gap = event.at - events[i - 1].at;
            assert!(
                gap >= Duration::from_millis(200),
                "{} after {}: {:?}",
                event.key,
                events[i - 1].key,
                gap
            );
        }
        h.queue.stop().await;
    }
}
