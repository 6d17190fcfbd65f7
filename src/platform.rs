//! Offline capability adapters.
//!
//! These stand in for screen capture, input synthesis and process probing so
//! the whole loop can be exercised against image files: frames come from
//! disk, injected input is only logged.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use action_dispatcher::{InputInjector, KeyEvent, PointerEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gamepilot_core_types::{PilotError, Point};
use match_engine::{Frame, FrameSource};
use parking_lot::Mutex;
use task_runner::{GameProbe, ProcessInfo, WindowInfo};
use tracing::{debug, info};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Serves frames decoded from image files, in file-name order, wrapping
/// around after the last one.
pub struct ImageFileSource {
    frames: Vec<Frame>,
    paths: Vec<PathBuf>,
    cursor: AtomicUsize,
}

impl ImageFileSource {
    /// `path` is either one image or a directory of images.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let paths = if path.is_dir() {
            let mut paths: Vec<_> = std::fs::read_dir(path)
                .with_context(|| format!("failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                })
                .collect();
            paths.sort();
            paths
        } else {
            vec![path.to_path_buf()]
        };
        if paths.is_empty() {
            bail!("no frame images found in {}", path.display());
        }

        let frames = paths
            .iter()
            .map(|p| {
                let image = image::open(p).with_context(|| format!("failed to decode {}", p.display()))?;
                Ok(Frame::from_dynamic(image))
            })
            .collect::<Result<Vec<_>>>()?;
        info!(frames = frames.len(), source = %path.display(), "frame source opened");
        Ok(Self {
            frames,
            paths,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn first(&self) -> Option<&Frame> {
        self.frames.first()
    }
}

#[async_trait]
impl FrameSource for ImageFileSource {
    async fn capture_frame(&self) -> Result<Option<Frame>, PilotError> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.frames.len();
        debug!(frame = %self.paths[idx].display(), "frame served");
        Ok(Some(self.frames[idx].clone()))
    }
}

/// Dry-run injector: every event is logged and counted, nothing reaches the OS.
#[derive(Default)]
pub struct TracingInjector {
    cursor: Mutex<Option<Point>>,
    injected: AtomicUsize,
}

impl TracingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InputInjector for TracingInjector {
    async fn inject_pointer(&self, event: PointerEvent) -> Result<(), PilotError> {
        *self.cursor.lock() = Some(event.position);
        self.injected.fetch_add(1, Ordering::Relaxed);
        info!(x = event.position.x, y = event.position.y, action = ?event.action, "pointer (dry run)");
        Ok(())
    }

    async fn inject_key(&self, event: KeyEvent) -> Result<(), PilotError> {
        self.injected.fetch_add(1, Ordering::Relaxed);
        info!(key = ?event, "key (dry run)");
        Ok(())
    }

    fn cursor_position(&self) -> Option<Point> {
        *self.cursor.lock()
    }
}

/// Probe that reports a fixed process and window list.
#[derive(Clone, Debug, Default)]
pub struct StaticProbe {
    pub processes: Vec<ProcessInfo>,
    pub windows: Vec<WindowInfo>,
}

impl StaticProbe {
    pub fn with_process(mut self, pid: u32, name: impl Into<String>) -> Self {
        self.processes.push(ProcessInfo {
            pid,
            name: name.into(),
        });
        self
    }
}

#[async_trait]
impl GameProbe for StaticProbe {
    async fn processes(&self) -> Result<Vec<ProcessInfo>, PilotError> {
        Ok(self.processes.clone())
    }

    async fn windows(&self) -> Result<Vec<WindowInfo>, PilotError> {
        Ok(self.windows.clone())
    }
}
