use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
pub mod mappings;
mod services;
mod utils;

use config::Config;
use events::{EventBus, ProcessTarget};
use services::detection::{create_screen_capturer, DetectionOrchestrator, NccMatcher, TemplateTrigger};
use services::{
    create_control_listener, create_key_injector, create_notifier, create_window_locator, ActionQueue,
    AutoClickMonitor, CommandReceiver, Coordinator, ExecutionEngine, KeySender, MonitoringLoop, WindowFocusTracker,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "automacro")]
#[command(about = "Нажатия клавиш по расписанию с контролем состояния игры и оповещениями в Telegram")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "automacro.toml")]
    config: String,

    /// Режим сухого запуска (без реального ввода и захвата экрана)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Запустить макрос и мониторинг сразу после старта
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск Automacro v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные действия отключены");
    } else {
        utils::permissions::check_permissions(config.control.enabled)?;
    }

    let bus = Arc::new(EventBus::new());
    let target = ProcessTarget::new(config.target.process_name.as_str()).with_window_title(config.target.window_title.clone());
    info!("Целевой процесс: {}", target);

    let pointer = config
        .auto_click
        .enabled
        .then_some((config.auto_click.screen_width, config.auto_click.screen_height));
    let injector = create_key_injector(args.dry_run, pointer)?;
    // Единственная очередь ввода: расписание макроса, удалённые клавиши и автощелчок
    let queue = Arc::new(ActionQueue::new(injector.clone(), config.injector.clone()));
    queue.start();

    let locator = create_window_locator(&config.window, args.dry_run).await?;
    let capturer = create_screen_capturer(&config.window, locator.clone(), args.dry_run);
    let matcher = Arc::new(NccMatcher::new(config.detection.downscale));
    let detector = Arc::new(DetectionOrchestrator::new(
        &config.detection,
        &config.regions,
        capturer.clone(),
        matcher.clone(),
    ));
    if !detector.templates_loaded() {
        warn!("Эталоны не загружены: проверка всплывающих окон и интерфейса работать не будет");
    }
    let notifier = create_notifier(&config.telegram)?;

    let focus = Arc::new(WindowFocusTracker::new(locator.clone(), target.clone()));
    let engine = ExecutionEngine::new(
        config.engine.clone(),
        config.main_loop.clone(),
        &config.hotkeys,
        queue.clone(),
        focus.clone(),
        bus.clone(),
    );
    let auto_click = config.auto_click.enabled.then(|| {
        let trigger = TemplateTrigger::new(&config.auto_click, &config.detection, capturer.clone(), matcher.clone());
        if !trigger.template_loaded() {
            warn!("Эталон автощелчка не загружен: щелчков не будет");
        }
        AutoClickMonitor::new(&config.auto_click, Arc::new(trigger), engine.clone(), focus.clone(), bus.clone())
    });
    let monitoring = MonitoringLoop::new(
        config.timing.clone(),
        config.messages.clone(),
        target,
        locator,
        detector,
        notifier,
        bus.clone(),
    );
    let coordinator = Coordinator::new(
        engine,
        monitoring,
        focus.clone(),
        bus.clone(),
        &config.timing,
        config.messages.clone(),
    );
    let key_sender = Arc::new(KeySender::new(queue.clone(), focus.clone()));

    info!("Все компоненты инициализированы");

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let listener = create_control_listener(&config.control, args.dry_run)?;
    tasks.push(tokio::spawn({
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(e) = listener.run(coordinator, cancel).await {
                error!("Ошибка в слушателе клавиш управления: {}", e);
            }
        }
    }));

    tasks.push(spawn_reload_on_hangup(args.config.clone(), coordinator.clone(), cancel.clone())?);

    if let Some(monitor) = auto_click {
        tasks.push(monitor.spawn(cancel.clone()));
    }

    if config.telegram.is_usable() && config.telegram.commands_enabled {
        match CommandReceiver::new(
            &config.telegram,
            bus.clone(),
            coordinator.clone(),
            key_sender.clone(),
            capturer,
            focus,
            config.regions.screenshot,
        ) {
            Ok(receiver) => tasks.push(receiver.spawn(cancel.clone())),
            Err(e) => warn!("Команды из Telegram недоступны: {}", e),
        }
    }

    if args.autostart {
        coordinator.start_all().await;
    } else {
        info!("Ожидание команды запуска ('{}' или Telegram /start)", config.control.toggle_key);
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
        Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
    }

    info!("Завершение работы...");
    cancel.cancel();
    coordinator.shutdown().await;
    queue.stop().await;

    // Гарантируем отсутствие залипших клавиш
    if let Err(e) = injector.release_all() {
        warn!("Не удалось отпустить клавиши: {}", e);
    }

    let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
    let joined = timeout(SHUTDOWN_TIMEOUT, async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    match joined {
        Ok(()) => info!("Все сервисы завершили работу корректно"),
        Err(_) => {
            warn!("Таймаут при завершении сервисов, прерываем");
            aborts.iter().for_each(|abort| abort.abort());
        }
    }

    info!("Automacro завершил работу");
    Ok(())
}

/// SIGHUP перечитывает конфигурацию и заменяет слоты горячих клавиш без остановки макроса
fn spawn_reload_on_hangup(
    config_path: String,
    coordinator: Arc<Coordinator>,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }

            info!("Получен SIGHUP, перечитываем {}", config_path);
            match Config::load(&config_path) {
                Ok(config) => coordinator.reload_hotkeys(&config.hotkeys),
                Err(e) => error!("Конфигурация не перезагружена: {:#}", e),
            }
        }
    }))
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
