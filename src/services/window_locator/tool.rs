use crate::automacro_error;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{ProcessTarget, WindowGeometry, WindowHandle};
use std::collections::HashMap;
use std::fmt;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use super::process::ProcessFinder;
use super::r#trait::WindowLocator;

/// CLI-утилита для работы с окнами
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// X11
    Xdotool,
    /// KDE Plasma (X11 и Wayland)
    Kdotool,
}

impl Tool {
    fn binary(&self) -> &'static str {
        match self {
            Tool::Xdotool => "xdotool",
            Tool::Kdotool => "kdotool",
        }
    }

    /// Определить рабочую утилиту: сначала kdotool, затем xdotool
    pub async fn detect() -> Result<Self> {
        for tool in [Tool::Kdotool, Tool::Xdotool] {
            match run(tool, &["getactivewindow"]).await {
                Ok(output) if output.status.success() => return Ok(tool),
                Ok(output) => {
                    debug!("{} getactivewindow failed: {}", tool, String::from_utf8_lossy(&output.stderr));
                }
                Err(e) => debug!("{} недоступен: {}", tool, e),
            }
        }

        Err(automacro_error!(service_unavailable, "Ни kdotool, ни xdotool не работают"))
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Переменные окружения пользовательской сессии при запуске через sudo
fn build_env_overrides() -> HashMap<String, String> {
    let mut env_vars = HashMap::new();

    if std::env::var("USER").unwrap_or_default() == "root" {
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            if let Ok(output) = std::process::Command::new("id").args(["-u", &sudo_user]).output() {
                if let Ok(uid_str) = String::from_utf8(output.stdout) {
                    let runtime_dir = format!("/run/user/{}", uid_str.trim());
                    env_vars.insert("DBUS_SESSION_BUS_ADDRESS".to_string(), format!("unix:path={}/bus", runtime_dir));
                    env_vars.insert("XDG_RUNTIME_DIR".to_string(), runtime_dir);
                    env_vars.insert("USER".to_string(), sudo_user);
                }
            }
        }
    }

    if let Ok(display_var) = std::env::var("DISPLAY") {
        env_vars.insert("DISPLAY".to_string(), display_var);
    }

    env_vars
}

fn create_command(tool: Tool, args: &[&str]) -> Command {
    // kdotool ходит в KWin через D-Bus сессии пользователя, поэтому из-под sudo запускаем от его имени
    let mut cmd = match (tool, std::env::var("SUDO_USER")) {
        (Tool::Kdotool, Ok(sudo_user)) => {
            let mut cmd = Command::new("sudo");
            cmd.args(["-E", "-u", &sudo_user, tool.binary()]);
            cmd
        }
        _ => Command::new(tool.binary()),
    };
    cmd.args(args).kill_on_drop(true);

    for (key, value) in build_env_overrides() {
        cmd.env(key, value);
    }

    cmd
}

async fn run(tool: Tool, args: &[&str]) -> Result<Output> {
    let output = create_command(tool, args)
        .output()
        .await
        .map_err(|e| automacro_error!(window, "{} не найден: {}", tool, e))?;
    Ok(output)
}

/// Разобрать вывод `getwindowgeometry` (обычный или `--shell`)
pub(crate) fn parse_geometry(output: &str) -> Option<WindowGeometry> {
    let mut position: Option<(i32, i32)> = None;
    let mut size: Option<(u32, u32)> = None;
    let mut shell = HashMap::new();

    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Position:") {
            let coords = rest.split_whitespace().next()?;
            let (x, y) = coords.split_once(',')?;
            position = Some((x.trim().parse().ok()?, y.trim().parse().ok()?));
        } else if let Some(rest) = line.strip_prefix("Geometry:") {
            let (w, h) = rest.trim().split_once('x')?;
            size = Some((w.trim().parse().ok()?, h.trim().parse().ok()?));
        } else if let Some((key, value)) = line.split_once('=') {
            shell.insert(key, value);
        }
    }

    if position.is_none() {
        if let (Some(x), Some(y)) = (shell.get("X"), shell.get("Y")) {
            position = Some((x.parse().ok()?, y.parse().ok()?));
        }
    }
    if size.is_none() {
        if let (Some(w), Some(h)) = (shell.get("WIDTH"), shell.get("HEIGHT")) {
            size = Some((w.parse().ok()?, h.parse().ok()?));
        }
    }

    let ((x, y), (width, height)) = (position?, size?);
    Some(WindowGeometry { x, y, width, height })
}

/// WindowLocator поверх xdotool/kdotool и sysinfo
pub struct ToolLocator {
    tool: Tool,
    processes: ProcessFinder,
}

impl ToolLocator {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            processes: ProcessFinder::new(),
        }
    }

    async fn stdout(&self, args: &[&str]) -> Result<Option<String>> {
        let output = run(self.tool, args).await?;
        if !output.status.success() {
            debug_if_enabled!(
                "{} {:?} завершился с ошибкой: {}",
                self.tool,
                args,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    async fn window_name(&self, id: &str) -> Result<String> {
        Ok(self.stdout(&["getwindowname", id]).await?.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl WindowLocator for ToolLocator {
    async fn find_process(&self, target: &ProcessTarget) -> Result<Option<u32>> {
        self.processes.find(target).await
    }

    async fn find_process_window(&self, target: &ProcessTarget) -> Result<Option<WindowHandle>> {
        let Some(pid) = self.find_process(target).await? else {
            return Ok(None);
        };

        let pid_arg = pid.to_string();
        let args: Vec<&str> = match self.tool {
            Tool::Xdotool => vec!["search", "--onlyvisible", "--pid", pid_arg.as_str()],
            Tool::Kdotool => vec!["search", "--pid", pid_arg.as_str()],
        };
        let Some(ids) = self.stdout(&args).await? else {
            return Ok(None);
        };

        for id in ids.lines().map(str::trim).filter(|id| !id.is_empty()) {
            if target.window_title.is_none() {
                return Ok(Some(WindowHandle::new(id, pid)));
            }
            let title = self.window_name(id).await?;
            if target.matches_title(&title) {
                debug_if_enabled!("Окно '{}' ({}) подходит для {}", title, id, target);
                return Ok(Some(WindowHandle::new(id, pid)));
            }
        }

        Ok(None)
    }

    async fn is_focused(&self, handle: &WindowHandle) -> Result<bool> {
        let Some(active) = self.stdout(&["getactivewindow"]).await? else {
            return Ok(false);
        };
        if active == handle.id {
            return Ok(true);
        }

        // Активным может оказаться другое окно того же процесса (лаунчер, диалог)
        let active_pid = self
            .stdout(&["getwindowpid", &active])
            .await?
            .and_then(|pid| pid.parse::<u32>().ok());
        Ok(active_pid == Some(handle.pid))
    }

    async fn bring_to_front(&self, handle: &WindowHandle) -> Result<bool> {
        Ok(self.stdout(&["windowactivate", &handle.id]).await?.is_some())
    }

    async fn window_geometry(&self, handle: &WindowHandle) -> Result<Option<WindowGeometry>> {
        Ok(self
            .stdout(&["getwindowgeometry", &handle.id])
            .await?
            .and_then(|out| parse_geometry(&out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_geometry() {
        let out = "Window 65011714\n  Position: 100,50 (screen: 0)\n  Geometry: 1920x1080\n";
        assert_eq!(
            parse_geometry(out),
            Some(WindowGeometry { x: 100, y: 50, width: 1920, height: 1080 })
        );
    }

    #[test]
    fn test_parse_shell_geometry() {
        let out = "WINDOW=65011714\nX=-8\nY=0\nWIDTH=1366\nHEIGHT=768\nSCREEN=0\n";
        assert_eq!(
            parse_geometry(out),
            Some(WindowGeometry { x: -8, y: 0, width: 1366, height: 768 })
        );
    }

    #[test]
    fn test_parse_incomplete_geometry() {
        assert_eq!(parse_geometry("Window 1\n  Position: 0,0\n"), None);
        assert_eq!(parse_geometry(""), None);
    }
}
