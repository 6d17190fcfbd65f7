use std::sync::Arc;

use async_trait::async_trait;
use gamepilot_core_types::{PilotError, Rect};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::task::TaskContext;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub bounds: Option<Rect>,
}

/// Process and window enumeration, provided by the platform layer.
#[async_trait]
pub trait GameProbe: Send + Sync {
    async fn processes(&self) -> Result<Vec<ProcessInfo>, PilotError>;

    async fn windows(&self) -> Result<Vec<WindowInfo>, PilotError>;
}

/// A condition that must hold before a task body runs.
#[async_trait]
pub trait Precondition: Send + Sync {
    fn describe(&self) -> String;

    async fn check(&self, ctx: &TaskContext) -> bool;
}

/// Passes when a known game process is alive or a window title mentions
/// one of the keywords. Probe failures count as "not running".
pub struct GameRunningCheck {
    probe: Arc<dyn GameProbe>,
    process_names: Vec<String>,
    window_keywords: Vec<String>,
}

impl GameRunningCheck {
    pub fn new(probe: Arc<dyn GameProbe>) -> Self {
        Self {
            probe,
            process_names: Vec::new(),
            window_keywords: Vec::new(),
        }
    }

    pub fn with_process(mut self, name: impl Into<String>) -> Self {
        self.process_names.push(name.into().to_lowercase());
        self
    }

    pub fn with_window_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.window_keywords.push(keyword.into().to_lowercase());
        self
    }

    pub async fn is_running(&self) -> bool {
        match self.probe.processes().await {
            Ok(processes) => {
                if let Some(found) = processes
                    .iter()
                    .find(|p| self.process_names.contains(&p.name.to_lowercase()))
                {
                    debug!(pid = found.pid, name = %found.name, "game process found");
                    return true;
                }
            }
            Err(err) => warn!(error = %err, "process enumeration failed"),
        }

        if self.window_keywords.is_empty() {
            return false;
        }
        match self.probe.windows().await {
            Ok(windows) => windows.iter().any(|w| {
                let title = w.title.to_lowercase();
                self.window_keywords.iter().any(|k| title.contains(k))
            }),
            Err(err) => {
                warn!(error = %err, "window enumeration failed");
                false
            }
        }
    }
}

#[async_trait]
impl Precondition for GameRunningCheck {
    fn describe(&self) -> String {
        format!(
            "game running (processes {:?}, windows {:?})",
            self.process_names, self.window_keywords
        )
    }

    async fn check(&self, _ctx: &TaskContext) -> bool {
        self.is_running().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        processes: Result<Vec<ProcessInfo>, PilotError>,
        windows: Vec<WindowInfo>,
    }

    #[async_trait]
    impl GameProbe for Fixed {
        async fn processes(&self) -> Result<Vec<ProcessInfo>, PilotError> {
            self.processes.clone()
        }

        async fn windows(&self) -> Result<Vec<WindowInfo>, PilotError> {
            Ok(self.windows.clone())
        }
    }

    #[tokio::test]
    async fn matches_process_names_case_insensitively() {
        let probe = Arc::new(Fixed {
            processes: Ok(vec![ProcessInfo {
                pid: 42,
                name: "Game.EXE".into(),
            }]),
            windows: Vec::new(),
        });
        assert!(GameRunningCheck::new(probe.clone()).with_process("game.exe").is_running().await);
        assert!(!GameRunningCheck::new(probe).with_process("other.exe").is_running().await);
    }

    #[tokio::test]
    async fn falls_back_to_window_titles_when_processes_fail() {
        let probe = Arc::new(Fixed {
            processes: Err(PilotError::new("denied")),
            windows: vec![WindowInfo {
                title: "Azur Fleet - Main".into(),
                pid: None,
                bounds: None,
            }],
        });
        let check = GameRunningCheck::new(probe)
            .with_process("fleet.exe")
            .with_window_keyword("azur fleet");
        assert!(check.is_running().await);
    }
}
