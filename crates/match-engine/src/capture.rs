use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gamepilot_core_types::PilotError;
use parking_lot::Mutex;

use crate::models::Frame;

/// Screen capture capability.
///
/// `Ok(None)` means nothing could be captured right now (window hidden,
/// surface minimized) and is treated as "not found". `Err` is reserved for
/// failures of the capture API itself.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture_frame(&self) -> Result<Option<Frame>, PilotError>;
}

/// In-memory frames served in order, holding the last one once exhausted
/// or cycling when configured to.
pub struct FrameSequence {
    frames: Mutex<Vec<Frame>>,
    cursor: AtomicUsize,
    cycle: bool,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: Mutex::new(frames),
            cursor: AtomicUsize::new(0),
            cycle: false,
        }
    }

    pub fn cycling(frames: Vec<Frame>) -> Self {
        Self {
            cycle: true,
            ..Self::new(frames)
        }
    }

    /// Replaces the frames and restarts from the first one.
    pub fn replace(&self, frames: Vec<Frame>) {
        let mut guard = self.frames.lock();
        *guard = frames;
        self.cursor.store(0, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[async_trait]
impl FrameSource for FrameSequence {
    async fn capture_frame(&self) -> Result<Option<Frame>, PilotError> {
        let frames = self.frames.lock();
        if frames.is_empty() {
            return Ok(None);
        }
        let position = self.cursor.fetch_add(1, Ordering::SeqCst);
        let idx = if self.cycle {
            position % frames.len()
        } else {
            position.min(frames.len() - 1)
        };
        Ok(Some(frames[idx].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn frame(shade: u8) -> Frame {
        Frame::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([shade, shade, shade, 255])))
    }

    fn shade(frame: Option<Frame>) -> u8 {
        frame.unwrap().luma().get_pixel(0, 0).0[0]
    }

    #[tokio::test]
    async fn holds_last_frame_when_exhausted() {
        let source = FrameSequence::new(vec![frame(10), frame(200)]);
        assert_eq!(shade(source.capture_frame().await.unwrap()), 10);
        assert_eq!(shade(source.capture_frame().await.unwrap()), 200);
        assert_eq!(shade(source.capture_frame().await.unwrap()), 200);
    }

    #[tokio::test]
    async fn cycling_wraps_and_empty_yields_none() {
        let source = FrameSequence::cycling(vec![frame(10), frame(200)]);
        source.capture_frame().await.unwrap();
        source.capture_frame().await.unwrap();
        assert_eq!(shade(source.capture_frame().await.unwrap()), 10);

        source.replace(Vec::new());
        assert!(source.capture_frame().await.unwrap().is_none());
    }
}
