use crate::automacro_error;
use crate::config::TelegramConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{EngineState, EventBus, Region, StatusMessage, SystemAlert};
use crate::services::coordinator::Coordinator;
use crate::services::detection::{encode_png, ScreenCapturer};
use crate::services::focus_tracker::WindowFocusTracker;
use crate::services::key_sender::KeySender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::telegram::{Message, TelegramApi};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const UNKNOWN_REPLY: &str = "Unknown command. Try /status, /screenshot, /sendkey <key> or /hotkey <slot> on|off";

/// Команда оператора из чата
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    SendKey(String),
    SendText(String),
    Screenshot,
    Status,
    Start,
    Stop,
    Pause,
    Resume,
    Hotkey { id: String, enabled: bool },
    /// Команда без обязательного аргумента; внутри - подсказка
    Usage(&'static str),
    Unknown,
}

/// Разобрать текст сообщения. Имя команды без учёта регистра, суффикс `@bot` отбрасывается.
pub fn parse_command(text: &str) -> BotCommand {
    let text = text.trim();
    if !text.starts_with('/') {
        return BotCommand::Unknown;
    }

    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();

    match name.as_str() {
        "/sendkey" if rest.is_empty() => BotCommand::Usage("Usage: /sendkey <key>"),
        "/sendkey" => BotCommand::SendKey(rest.to_string()),
        "/sendtext" if rest.is_empty() => BotCommand::Usage("Usage: /sendtext <text>"),
        "/sendtext" => BotCommand::SendText(rest.to_string()),
        "/screenshot" => BotCommand::Screenshot,
        "/status" => BotCommand::Status,
        "/start" => BotCommand::Start,
        "/stop" => BotCommand::Stop,
        "/pause" => BotCommand::Pause,
        "/resume" => BotCommand::Resume,
        "/hotkey" => parse_hotkey_toggle(rest),
        _ => BotCommand::Unknown,
    }
}

const HOTKEY_USAGE: &str = "Usage: /hotkey <slot> on|off";

/// `/hotkey 3 off` и `/hotkey hotkey3 off` означают один и тот же слот
fn parse_hotkey_toggle(rest: &str) -> BotCommand {
    let mut parts = rest.split_whitespace();
    let (Some(slot), Some(state), None) = (parts.next(), parts.next(), parts.next()) else {
        return BotCommand::Usage(HOTKEY_USAGE);
    };

    let enabled = match state.to_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => return BotCommand::Usage(HOTKEY_USAGE),
    };
    let id = if slot.chars().all(|c| c.is_ascii_digit()) {
        format!("hotkey{}", slot)
    } else {
        slot.to_string()
    };

    BotCommand::Hotkey { id, enabled }
}

/// Текст сообщения, если оно пришло из нашего чата и после запуска
fn accepted_text(message: &Message, chat_id: i64, started_at: i64) -> Option<&str> {
    if message.chat.id != chat_id || message.date < started_at {
        return None;
    }
    message.text.as_deref()
}

enum Reply {
    Text(String),
    Photo(Vec<u8>),
}

/// Подписка на шину: запоминает последний статус и отдаёт системные оповещения
struct BusFeed {
    status: broadcast::Receiver<StatusMessage>,
    alerts: broadcast::Receiver<SystemAlert>,
    last_status: Arc<Mutex<Option<StatusMessage>>>,
}

impl BusFeed {
    fn new(bus: &EventBus, last_status: Arc<Mutex<Option<StatusMessage>>>) -> Self {
        Self {
            status: bus.subscribe_status(),
            alerts: bus.subscribe_alerts(),
            last_status,
        }
    }

    /// Следующее оповещение; `None`, когда шина закрыта
    async fn next_alert(&mut self) -> Option<SystemAlert> {
        loop {
            tokio::select! {
                biased;
                status = self.status.recv() => match status {
                    Ok(status) => *self.last_status.lock() = Some(status),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return None,
                },
                alert = self.alerts.recv() => match alert {
                    Ok(alert) => return Some(alert),
                    Err(RecvError::Lagged(skipped)) => warn!("Пропущено оповещений: {}", skipped),
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

/// Приём команд из Telegram через long polling
pub struct CommandReceiver {
    api: TelegramApi,
    chat_id: i64,
    poll_timeout_secs: u64,
    started_at: i64,
    coordinator: Arc<Coordinator>,
    keys: Arc<KeySender>,
    capturer: Arc<dyn ScreenCapturer>,
    focus: Arc<WindowFocusTracker>,
    screenshot_region: Region,
    bus: Arc<EventBus>,
    last_status: Arc<Mutex<Option<StatusMessage>>>,
}

impl CommandReceiver {
    pub fn new(
        config: &TelegramConfig,
        bus: Arc<EventBus>,
        coordinator: Arc<Coordinator>,
        keys: Arc<KeySender>,
        capturer: Arc<dyn ScreenCapturer>,
        focus: Arc<WindowFocusTracker>,
        screenshot_region: Region,
    ) -> Result<Self> {
        let api = TelegramApi::from_config(config)?;
        let chat_id = api
            .chat_id()
            .parse::<i64>()
            .map_err(|_| automacro_error!(service_unavailable, "Telegram: chat_id '{}' не число", api.chat_id()))?;
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        Ok(Self {
            api,
            chat_id,
            poll_timeout_secs: config.poll_timeout_secs,
            started_at,
            coordinator,
            keys,
            capturer,
            focus,
            screenshot_region,
            bus,
            last_status: Arc::new(Mutex::new(None)),
        })
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let feed = BusFeed::new(&self.bus, self.last_status.clone());
        tokio::spawn(async move {
            tokio::join!(self.run(cancel.clone()), self.forward_alerts(feed, cancel));
        })
    }

    /// Автоостановка и прочие системные оповещения уходят в тот же чат
    async fn forward_alerts(&self, mut feed: BusFeed, cancel: CancellationToken) {
        loop {
            let alert = tokio::select! {
                _ = cancel.cancelled() => break,
                alert = feed.next_alert() => alert,
            };
            let Some(alert) = alert else {
                break;
            };
            if let Err(e) = self.api.send_message(&format!("⚠️ {}", alert.message)).await {
                warn!("Не удалось переслать оповещение {}: {}", alert.kind, e);
            }
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        info!("📨 Приём команд из Telegram запущен");
        let mut offset: Option<i64> = None;

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.get_updates(offset, self.poll_timeout_secs) => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Telegram getUpdates: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                let Some(text) = update
                    .message
                    .as_ref()
                    .and_then(|m| accepted_text(m, self.chat_id, self.started_at))
                else {
                    continue;
                };

                let command = parse_command(text);
                debug_if_enabled!("Команда из Telegram: {:?}", command);
                let reply = self.execute(command).await;
                if let Err(e) = self.send_reply(reply).await {
                    warn!("Не удалось ответить в Telegram: {}", e);
                }
            }
        }

        info!("Приём команд из Telegram остановлен");
    }

    async fn send_reply(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Text(text) => self.api.send_message(&text).await,
            Reply::Photo(png) => self.api.send_photo(png, "Here is your screenshot").await,
        }
    }

    async fn execute(&self, command: BotCommand) -> Reply {
        let text = match command {
            BotCommand::SendKey(spec) => match self.keys.send_key(&spec, None).await {
                Ok(_) => format!("Sent key: {}", spec),
                Err(e) => format!("Failed to send key: {}", e),
            },
            BotCommand::SendText(text) => match self.keys.send_text(&text).await {
                Ok(_) => format!("Sent text: {}", text),
                Err(e) => format!("Failed to send text: {}", e),
            },
            BotCommand::Screenshot => match self.screenshot().await {
                Ok(png) => return Reply::Photo(png),
                Err(e) => format!("Screenshot failed: {}", e),
            },
            BotCommand::Status => {
                let summary = self.coordinator.status_summary();
                match self.last_status.lock().as_ref() {
                    Some(last) => format!("{}\nLast event: {}", summary, last),
                    None => summary,
                }
            }
            BotCommand::Start => {
                if self.coordinator.start_all().await {
                    self.coordinator.focus_game_window().await;
                    "Macro started".to_string()
                } else {
                    "Macro is already running".to_string()
                }
            }
            BotCommand::Stop => {
                if self.coordinator.stop_all().await {
                    "Macro stopped".to_string()
                } else {
                    "Macro is not running".to_string()
                }
            }
            BotCommand::Pause => {
                if self.coordinator.pause_macro("команда из Telegram") {
                    "Macro paused".to_string()
                } else if self.coordinator.is_macro_running() {
                    "Macro is already paused".to_string()
                } else {
                    "Macro is not running".to_string()
                }
            }
            BotCommand::Resume => {
                if self.coordinator.resume_macro() {
                    "Macro resumed".to_string()
                } else if self.coordinator.macro_state() == EngineState::Stopped {
                    "Macro is not running".to_string()
                } else {
                    "Macro is not paused".to_string()
                }
            }
            BotCommand::Hotkey { id, enabled } => {
                if self.coordinator.set_hotkey_enabled(&id, enabled) {
                    format!("{} {}", id, if enabled { "enabled" } else { "disabled" })
                } else {
                    format!("Unknown hotkey slot: {}", id)
                }
            }
            BotCommand::Usage(usage) => usage.to_string(),
            BotCommand::Unknown => UNKNOWN_REPLY.to_string(),
        };
        Reply::Text(text)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let handle = self
            .focus
            .current_handle()
            .await?
            .ok_or_else(|| automacro_error!(window, "окно игры не найдено"))?;

        let image = self
            .capturer
            .capture_region(&handle, self.screenshot_region)
            .await?
            .ok_or_else(|| automacro_error!(capture, "снимок не получен"))?;

        encode_png(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AlertKind;
    use crate::services::notifier::telegram::Chat;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/sendkey esc"), BotCommand::SendKey("esc".to_string()));
        assert_eq!(parse_command("/SendKey   enter 3 "), BotCommand::SendKey("enter 3".to_string()));
        assert_eq!(parse_command("/sendtext hello there"), BotCommand::SendText("hello there".to_string()));
        assert_eq!(parse_command("/screenshot@my_macro_bot"), BotCommand::Screenshot);
        assert_eq!(parse_command(" /status "), BotCommand::Status);
        assert_eq!(parse_command("/start"), BotCommand::Start);
        assert_eq!(parse_command("/stop"), BotCommand::Stop);
        assert_eq!(parse_command("/pause"), BotCommand::Pause);
        assert_eq!(parse_command("/resume"), BotCommand::Resume);
    }

    #[test]
    fn test_missing_argument_gets_usage() {
        assert_eq!(parse_command("/sendkey"), BotCommand::Usage("Usage: /sendkey <key>"));
        assert_eq!(parse_command("/sendtext   "), BotCommand::Usage("Usage: /sendtext <text>"));
    }

    #[test]
    fn test_hotkey_toggle() {
        assert_eq!(
            parse_command("/hotkey 3 off"),
            BotCommand::Hotkey {
                id: "hotkey3".to_string(),
                enabled: false
            }
        );
        assert_eq!(
            parse_command("/hotkey hotkey12 ON"),
            BotCommand::Hotkey {
                id: "hotkey12".to_string(),
                enabled: true
            }
        );
        assert_eq!(parse_command("/hotkey 3"), BotCommand::Usage(HOTKEY_USAGE));
        assert_eq!(parse_command("/hotkey 3 maybe"), BotCommand::Usage(HOTKEY_USAGE));
        assert_eq!(parse_command("/hotkey 3 on now"), BotCommand::Usage(HOTKEY_USAGE));
    }

    #[tokio::test]
    async fn test_feed_remembers_status_and_yields_alerts() {
        let bus = EventBus::new();
        let last = Arc::new(Mutex::new(None));
        let mut feed = BusFeed::new(&bus, last.clone());

        bus.log("MACRO", "запущен");
        bus.alert(SystemAlert {
            kind: AlertKind::GameNotRunning,
            message: "Macro auto-stopped: Game is not running".to_string(),
        });

        let alert = feed.next_alert().await.unwrap();
        assert_eq!(alert.kind, AlertKind::GameNotRunning);
        assert_eq!(last.lock().as_ref().map(|s| s.to_string()), Some("[MACRO] запущен".to_string()));
    }

    #[tokio::test]
    async fn test_feed_ends_with_bus() {
        let bus = EventBus::new();
        let mut feed = BusFeed::new(&bus, Arc::new(Mutex::new(None)));
        drop(bus);
        assert!(feed.next_alert().await.is_none());
    }

    #[test]
    fn test_unknown_input() {
        assert_eq!(parse_command("hello"), BotCommand::Unknown);
        assert_eq!(parse_command("/reboot"), BotCommand::Unknown);
        assert_eq!(parse_command(""), BotCommand::Unknown);
    }

    #[test]
    fn test_filters_foreign_and_stale_messages() {
        let message = |chat: i64, date: i64| Message {
            date,
            chat: Chat { id: chat },
            text: Some("/status".to_string()),
        };

        assert_eq!(accepted_text(&message(42, 1_000), 42, 1_000), Some("/status"));
        assert_eq!(accepted_text(&message(7, 1_000), 42, 1_000), None);
        assert_eq!(accepted_text(&message(42, 999), 42, 1_000), None);

        let no_text = Message {
            date: 2_000,
            chat: Chat { id: 42 },
            text: None,
        };
        assert_eq!(accepted_text(&no_text, 42, 1_000), None);
    }
}
