use std::collections::VecDeque;

use crate::model::Priority;

#[derive(Clone, Debug)]
pub struct Entry<T> {
    pub priority: Priority,
    pub seq: u64,
    pub item: T,
}

/// One FIFO per priority band, drained highest band first.
#[derive(Debug)]
pub struct PriorityLane<T> {
    queues: [VecDeque<Entry<T>>; 3],
    next_seq: u64,
}

impl<T> Default for PriorityLane<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityLane<T> {
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            next_seq: 0,
        }
    }

    /// Appends to the back of the band and returns the entry's sequence number.
    pub fn push(&mut self, priority: Priority, item: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queues[priority.index()].push_back(Entry {
            priority,
            seq,
            item,
        });
        seq
    }

    pub fn pop(&mut self) -> Option<Entry<T>> {
        self.queues.iter_mut().find_map(|queue| queue.pop_front())
    }

    pub fn peek(&self) -> Option<&Entry<T>> {
        self.queues.iter().find_map(|queue| queue.front())
    }

    /// Removes the first entry matching `pred`, keeping every other entry in place.
    pub fn remove_where<F>(&mut self, mut pred: F) -> Option<Entry<T>>
    where
        F: FnMut(&T) -> bool,
    {
        for queue in self.queues.iter_mut() {
            if let Some(pos) = queue.iter().position(|entry| pred(&entry.item)) {
                return queue.remove(pos);
            }
        }
        None
    }

    pub fn clear(&mut self) -> Vec<Entry<T>> {
        self.queues
            .iter_mut()
            .flat_map(|queue| queue.drain(..))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    pub fn len_by_priority(&self) -> [usize; 3] {
        let mut lengths = [0usize; 3];
        for (idx, queue) in self.queues.iter().enumerate() {
            lengths[idx] = queue.len();
        }
        lengths
    }

    /// Entries in the order they would be popped.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.queues.iter().flat_map(|queue| queue.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_priority_then_fifo() {
        let mut lane = PriorityLane::new();
        lane.push(Priority::Low, "low-1");
        lane.push(Priority::Medium, "medium-1");
        lane.push(Priority::High, "high-1");
        lane.push(Priority::Low, "low-2");
        lane.push(Priority::High, "high-2");

        let order: Vec<_> = std::iter::from_fn(|| lane.pop().map(|e| e.item)).collect();
        assert_eq!(order, vec!["high-1", "high-2", "medium-1", "low-1", "low-2"]);
        assert!(lane.is_empty());
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut lane = PriorityLane::new();
        for i in 0..4 {
            lane.push(Priority::Medium, i);
        }
        let removed = lane.remove_where(|item| *item == 1).unwrap();
        assert_eq!(removed.seq, 1);
        assert!(lane.remove_where(|item| *item == 42).is_none());

        let rest: Vec<_> = lane.iter().map(|e| e.item).collect();
        assert_eq!(rest, vec![0, 2, 3]);
        assert_eq!(lane.len_by_priority(), [0, 3, 0]);
    }

    #[test]
    fn clear_drains_every_band() {
        let mut lane = PriorityLane::new();
        for priority in Priority::ALL {
            lane.push(priority, ());
        }
        assert_eq!(lane.clear().len(), 3);
        assert_eq!(lane.len(), 0);
        assert!(lane.peek().is_none());
    }
}
