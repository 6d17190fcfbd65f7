use std::time::Instant;

use crate::models::{QueuedAction, RecordedAction};

/// Append-only log of executed actions, timed from `start()`.
#[derive(Debug, Default)]
pub struct Recorder {
    started: Option<Instant>,
    entries: Vec<RecordedAction>,
}

impl Recorder {
    /// Returns `false` if a recording is already running.
    pub fn start(&mut self) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(Instant::now());
        self.entries.clear();
        true
    }

    /// Ends the recording and hands back its entries; empty when idle.
    pub fn stop(&mut self) -> Vec<RecordedAction> {
        match self.started.take() {
            Some(_) => std::mem::take(&mut self.entries),
            None => Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.started.is_some()
    }

    pub fn record(&mut self, action: &QueuedAction) {
        if let Some(started) = self.started {
            self.entries.push(RecordedAction {
                action: action.clone(),
                offset: started.elapsed(),
            });
        }
    }
}
