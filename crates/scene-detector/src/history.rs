use std::collections::VecDeque;

use crate::models::DetectionResult;

/// Most recent raw results, oldest first.
#[derive(Debug)]
pub struct DetectionHistory {
    capacity: usize,
    entries: VecDeque<DetectionResult>,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    pub fn push(&mut self, result: DetectionResult) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    pub fn last(&self) -> Option<&DetectionResult> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<DetectionResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
