use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::Region;
use crate::mappings::KeyNames;

/// Максимальное количество слотов горячих клавиш
pub const MAX_HOTKEY_SLOTS: usize = 7;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub target: TargetConfig,
    pub main_loop: MainLoopSpec,
    /// Слоты горячих клавиш; порядок обхода - по имени слота
    pub hotkeys: BTreeMap<String, HotkeySpec>,
    pub engine: EngineConfig,
    pub injector: InjectorConfig,
    pub timing: TimingConfig,
    pub detection: DetectionConfig,
    pub regions: RegionsConfig,
    pub auto_click: AutoClickConfig,
    pub window: WindowConfig,
    pub control: ControlConfig,
    pub telegram: TelegramConfig,
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Целевой процесс игры
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub process_name: String,
    /// Необязательный фильтр по заголовку окна (подстрока, без учёта регистра)
    pub window_title: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_name: "MapleStory".to_string(),
            window_title: None,
        }
    }
}

/// Основная (низкоприоритетная) клавиша цикла
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MainLoopSpec {
    pub key: String,
    pub interval_ms: u64,
    pub press_duration_ms: u64,
}

impl MainLoopSpec {
    /// Цикл считается настроенным только при непустой клавише и ненулевом интервале
    pub fn is_configured(&self) -> bool {
        !self.key.trim().is_empty() && self.interval_ms > 0
    }
}

impl Default for MainLoopSpec {
    fn default() -> Self {
        Self {
            key: String::new(),
            interval_ms: 1000,
            press_duration_ms: 100,
        }
    }
}

/// Слот горячей клавиши с собственным интервалом
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HotkeySpec {
    pub key: String,
    pub interval_secs: u64,
    pub press_duration_ms: u64,
    pub enabled: bool,
}

impl Default for HotkeySpec {
    fn default() -> Self {
        Self {
            key: String::new(),
            interval_secs: 1,
            press_duration_ms: 100,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_ms: u64,
    pub unfocused_sleep_ms: u64,
    pub paused_sleep_ms: u64,
    pub base_block_ms: u64,
    pub extra_block_per_hotkey_ms: u64,
    pub max_consecutive_hotkeys: u32,
    pub max_block_ms: u64,
    pub min_hotkey_gap_ms: u64,
    pub main_settle_gap_ms: u64,
    pub hotkey_recent_window_ms: u64,
    pub block_poll_cap_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            unfocused_sleep_ms: 200,
            paused_sleep_ms: 100,
            base_block_ms: 750,
            extra_block_per_hotkey_ms: 350,
            max_consecutive_hotkeys: 4,
            max_block_ms: 2500,
            min_hotkey_gap_ms: 450,
            main_settle_gap_ms: 300,
            hotkey_recent_window_ms: 1000,
            block_poll_cap_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InjectorConfig {
    pub min_key_gap_ms: u64,
    pub press_jitter_ms: u64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            min_key_gap_ms: 200,
            press_jitter_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub detect_interval_ms: u64,
    pub detect_cooldown_secs: u64,
    pub ui_check_cooldown_secs: u64,
    pub ui_recheck_delay_ms: u64,
    pub error_backoff_ms: u64,
    pub start_settle_ms: u64,
}

impl TimingConfig {
    pub fn detect_interval(&self) -> Duration {
        Duration::from_millis(self.detect_interval_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            detect_interval_ms: 1000,
            detect_cooldown_secs: 30,
            ui_check_cooldown_secs: 60,
            ui_recheck_delay_ms: 5000,
            error_backoff_ms: 5000,
            start_settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub templates_dir: PathBuf,
    pub popup_template: String,
    pub ui_template: String,
    pub popup_threshold: f32,
    pub ui_threshold: f32,
    /// Целочисленный коэффициент уменьшения перед сопоставлением (1 - без уменьшения)
    pub downscale: u32,
}

impl DetectionConfig {
    pub fn popup_template_path(&self) -> PathBuf {
        self.templates_dir.join(&self.popup_template)
    }

    pub fn ui_template_path(&self) -> PathBuf {
        self.templates_dir.join(&self.ui_template)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("resources"),
            popup_template: "popup.png".to_string(),
            ui_template: "ui_check.png".to_string(),
            popup_threshold: 0.8,
            ui_threshold: 0.7,
            downscale: 2,
        }
    }
}

/// Области поиска относительно окна игры, `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegionsConfig {
    pub popup: Region,
    pub ui: Region,
    pub screenshot: Region,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            popup: Region::new(600, 424, 891, 1057),
            ui: Region::new(754, 1008, 941, 1114),
            screenshot: Region::new(582, 430, 1348, 706),
        }
    }
}

/// Щелчок мышью, когда в области появляется эталон
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoClickConfig {
    pub enabled: bool,
    /// Файл эталона внутри `detection.templates_dir`
    pub template: String,
    pub region: Region,
    pub threshold: f32,
    pub interval_ms: u64,
    /// Точка щелчка относительно окна игры
    pub click_x: i32,
    pub click_y: i32,
    /// Размер экрана для абсолютного указателя
    pub screen_width: u32,
    pub screen_height: u32,
}

impl AutoClickConfig {
    pub fn template_path(&self, detection: &DetectionConfig) -> PathBuf {
        detection.templates_dir.join(&self.template)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AutoClickConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            template: "template.png".to_string(),
            region: Region::new(0, 0, 1920, 1080),
            threshold: 0.85,
            interval_ms: 500,
            click_x: 0,
            click_y: 0,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    /// auto | xdotool | kdotool
    pub backend: String,
    /// import (X11) | grim (Wayland)
    pub capture: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            capture: "import".to_string(),
        }
    }
}

/// Глобальные клавиши управления
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub device_path: String,
    pub toggle_key: String,
    pub emergency_stop_key: String,
    pub pause_key: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_path: "auto".to_string(),
            toggle_key: "f9".to_string(),
            emergency_stop_key: "backslash".to_string(),
            pause_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub commands_enabled: bool,
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    /// Токен и чат заданы и отправка не отключена
    pub fn is_usable(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.enabled && filled(&self.bot_token) && filled(&self.chat_id)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            chat_id: None,
            commands_enabled: true,
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub game_not_running: String,
    pub popup_detected: String,
    pub ui_check_failed: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            game_not_running: "VM Game is not running".to_string(),
            popup_detected: "VM Popup detected in game".to_string(),
            ui_check_failed: "VM UI check failed - Game might be crashed".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("AUTOMACRO_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.target.process_name.trim().is_empty() {
            anyhow::bail!("target.process_name не может быть пустым");
        }

        if !self.main_loop.key.trim().is_empty() {
            Self::validate_key(&self.main_loop.key, "main_loop.key")?;
        }

        if self.hotkeys.len() > MAX_HOTKEY_SLOTS {
            anyhow::bail!(
                "Слишком много горячих клавиш: {} (максимум {})",
                self.hotkeys.len(),
                MAX_HOTKEY_SLOTS
            );
        }

        for (id, hotkey) in &self.hotkeys {
            // Пустая клавиша - допустимый "выключенный" слот
            if hotkey.key.trim().is_empty() {
                continue;
            }
            Self::validate_key(&hotkey.key, &format!("hotkeys.{}", id))?;
            if hotkey.enabled && hotkey.interval_secs == 0 {
                anyhow::bail!("hotkeys.{}: interval_secs должно быть больше 0", id);
            }
        }

        if self.engine.tick_ms == 0 {
            anyhow::bail!("engine.tick_ms должно быть больше 0");
        }
        if self.engine.max_consecutive_hotkeys == 0 {
            anyhow::bail!("engine.max_consecutive_hotkeys должно быть минимум 1");
        }
        if self.engine.max_block_ms < self.engine.base_block_ms {
            anyhow::bail!("engine.max_block_ms не может быть меньше base_block_ms");
        }

        if self.timing.detect_interval_ms < 100 {
            anyhow::bail!("timing.detect_interval_ms должно быть минимум 100");
        }

        for (name, threshold) in [
            ("popup_threshold", self.detection.popup_threshold),
            ("ui_threshold", self.detection.ui_threshold),
        ] {
            if !(threshold > 0.0 && threshold <= 1.0) {
                anyhow::bail!("detection.{} должен быть в диапазоне (0, 1]: {}", name, threshold);
            }
        }
        if self.detection.downscale == 0 {
            anyhow::bail!("detection.downscale должно быть минимум 1");
        }

        for (name, region) in [
            ("popup", &self.regions.popup),
            ("ui", &self.regions.ui),
            ("screenshot", &self.regions.screenshot),
        ] {
            if region.is_empty() {
                anyhow::bail!("regions.{}: пустая область {:?}", name, region);
            }
        }

        if self.auto_click.enabled {
            let click = &self.auto_click;
            if click.region.is_empty() {
                anyhow::bail!("auto_click.region: пустая область {:?}", click.region);
            }
            if !(click.threshold > 0.0 && click.threshold <= 1.0) {
                anyhow::bail!("auto_click.threshold должен быть в диапазоне (0, 1]: {}", click.threshold);
            }
            if click.interval_ms < 100 {
                anyhow::bail!("auto_click.interval_ms должно быть минимум 100");
            }
            if click.screen_width == 0 || click.screen_height == 0 {
                anyhow::bail!("auto_click: размер экрана не задан");
            }
        }

        match self.window.backend.as_str() {
            "auto" | "xdotool" | "kdotool" => {}
            _ => anyhow::bail!("Неверный backend окон: {}", self.window.backend),
        }

        match self.window.capture.as_str() {
            "import" | "grim" => {}
            _ => anyhow::bail!("Неверный метод захвата экрана: {}", self.window.capture),
        }

        Self::validate_key(&self.control.toggle_key, "control.toggle_key")?;
        Self::validate_key(&self.control.emergency_stop_key, "control.emergency_stop_key")?;
        if let Some(pause_key) = &self.control.pause_key {
            Self::validate_key(pause_key, "control.pause_key")?;
        }

        Ok(())
    }

    fn validate_key(key: &str, field: &str) -> Result<()> {
        if KeyNames::resolve(key).is_none() {
            anyhow::bail!("Неизвестная клавиша '{}' в {}", key, field);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[target]
process_name = "Game.exe"

[main_loop]
key = "a"
interval_ms = 800

[hotkeys.hotkey1]
key = "1"
interval_secs = 30

[hotkeys.hotkey2]
key = ""
enabled = false

[regions]
popup = [10, 20, 110, 220]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.target.process_name, "Game.exe");
        assert_eq!(config.main_loop.interval_ms, 800);
        assert_eq!(config.main_loop.press_duration_ms, 100);
        assert_eq!(config.hotkeys.len(), 2);
        assert_eq!(config.hotkeys["hotkey1"].interval_secs, 30);
        assert!(config.hotkeys["hotkey1"].enabled);
        assert_eq!(config.regions.popup, Region::new(10, 20, 110, 220));
        assert_eq!(config.regions.popup.width(), 100);
        // Незаданные секции берутся по умолчанию
        assert_eq!(config.timing.detect_cooldown_secs, 30);
    }

    #[test]
    fn test_rejects_unknown_key() {
        let mut config = Config::default();
        config.main_loop.key = "not-a-key".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_too_many_hotkeys() {
        let mut config = Config::default();
        for i in 0..=MAX_HOTKEY_SLOTS {
            config.hotkeys.insert(
                format!("hotkey{}", i),
                HotkeySpec {
                    key: "1".to_string(),
                    ..HotkeySpec::default()
                },
            );
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut config = Config::default();
        config.detection.popup_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auto_click_checked_only_when_enabled() {
        let mut config = Config::default();
        config.auto_click.interval_ms = 10;
        assert!(config.validate().is_ok());

        config.auto_click.enabled = true;
        assert!(config.validate().is_err());
        config.auto_click.interval_ms = 500;
        assert!(config.validate().is_ok());
        config.auto_click.region = Region::new(10, 10, 10, 40);
        assert!(config.validate().is_err());

        let detection = DetectionConfig::default();
        assert_eq!(
            AutoClickConfig::default().template_path(&detection),
            PathBuf::from("resources").join("template.png")
        );
    }

    #[test]
    fn test_main_loop_configured() {
        let mut spec = MainLoopSpec::default();
        assert!(!spec.is_configured());
        spec.key = "space".to_string();
        assert!(spec.is_configured());
        spec.interval_ms = 0;
        assert!(!spec.is_configured());
    }

    #[test]
    fn test_telegram_usable() {
        let mut telegram = TelegramConfig::default();
        assert!(!telegram.is_usable());
        telegram.bot_token = Some("123:abc".to_string());
        telegram.chat_id = Some("42".to_string());
        assert!(telegram.is_usable());
        telegram.enabled = false;
        assert!(!telegram.is_usable());
    }
}
