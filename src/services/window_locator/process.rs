use crate::error::{AutomacroError, Result};
use crate::events::ProcessTarget;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System};

/// Поиск процесса игры по имени через sysinfo
#[derive(Clone)]
pub struct ProcessFinder {
    system: Arc<Mutex<System>>,
}

impl Default for ProcessFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessFinder {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// PID первого процесса, чьё имя (или имя исполняемого файла) совпадает с целью
    pub async fn find(&self, target: &ProcessTarget) -> Result<Option<u32>> {
        let system = Arc::clone(&self.system);
        let target = target.clone();

        // Полное обновление списка процессов заметно по времени, не держим на нём рантайм
        tokio::task::spawn_blocking(move || {
            let mut system = system.lock();
            system.refresh_processes(ProcessesToUpdate::All, true);

            let pid = system
                .processes()
                .iter()
                .filter(|(_, process)| {
                    let name = process.name().to_string_lossy();
                    let exe_name = process
                        .exe()
                        .and_then(|path| path.file_name())
                        .map(|n| n.to_string_lossy().into_owned());

                    target.matches_process(&name)
                        || exe_name.is_some_and(|n| target.matches_process(&n))
                })
                .map(|(pid, _)| pid.as_u32())
                .min();

            Ok(pid)
        })
        .await
        .map_err(|e| AutomacroError::Internal(format!("Поиск процесса прерван: {}", e)))?
    }
}
