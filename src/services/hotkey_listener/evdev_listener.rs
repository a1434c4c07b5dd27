use crate::config::ControlConfig;
use crate::error::{AutomacroError, Result};
use crate::services::coordinator::Coordinator;
use crate::utils::DeviceFinder;
use crate::{debug_if_enabled, trace_if_enabled};
use evdev::{Device, EventType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::bindings::{dispatch, ControlBindings, ControlCommand};
use super::r#trait::ControlListener;

const MAX_CONSECUTIVE_READ_ERRORS: u32 = 20;

/// Чтение клавиатуры через evdev без захвата: клавиши управления доходят и до остальных приложений
pub struct EvdevControlListener {
    device: Device,
    bindings: ControlBindings,
}

impl EvdevControlListener {
    pub fn new(config: &ControlConfig) -> Result<Self> {
        info!("Инициализация слушателя клавиш управления");

        let bindings = ControlBindings::from_config(config)?;
        let device_path = DeviceFinder::find_keyboard_device(&config.device_path)?;
        let device = Device::open(&device_path).map_err(|e| {
            AutomacroError::DeviceNotFound(format!("Не удалось открыть устройство {:?}: {}", device_path, e))
        })?;

        info!("Устройство: {}", device.name().unwrap_or("Unknown"));
        info!(
            "Клавиши управления: старт/стоп '{}', аварийная остановка '{}'{}",
            config.toggle_key,
            config.emergency_stop_key,
            config
                .pause_key
                .as_deref()
                .map(|key| format!(", пауза '{}'", key))
                .unwrap_or_default()
        );

        Ok(Self { device, bindings })
    }

    /// Блокирующее чтение событий; завершается, когда получатель команд закрыт
    fn read_loop(mut device: Device, bindings: ControlBindings, tx: mpsc::UnboundedSender<ControlCommand>) -> Result<()> {
        let mut errors = 0u32;

        loop {
            let commands: Vec<ControlCommand> = match device.fetch_events() {
                Ok(events) => {
                    errors = 0;
                    events
                        .filter(|event| event.event_type() == EventType::KEY)
                        .filter_map(|event| {
                            trace_if_enabled!("Клавиша {} = {}", event.code(), event.value());
                            bindings.command_for(event.code(), event.value())
                        })
                        .collect()
                }
                Err(e) => {
                    errors += 1;
                    if errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        return Err(AutomacroError::Io(e));
                    }
                    error!("Ошибка чтения событий: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                    continue;
                }
            };

            for command in commands {
                debug_if_enabled!("Команда управления: {:?}", command);
                if tx.send(command).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ControlListener for EvdevControlListener {
    async fn run(self: Box<Self>, coordinator: Arc<Coordinator>, cancel: CancellationToken) -> Result<()> {
        let Self { device, bindings } = *self;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Отдельный поток ОС: блокирующее чтение не должно задерживать завершение рантайма
        std::thread::Builder::new()
            .name("control-keys".to_string())
            .spawn(move || {
                if let Err(e) = Self::read_loop(device, bindings, tx) {
                    error!("Чтение клавиш управления остановлено: {}", e);
                }
            })?;

        info!("Слушатель клавиш управления запущен");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => dispatch(&coordinator, command).await,
                    None => {
                        warn!("Поток чтения клавиатуры завершился");
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}
