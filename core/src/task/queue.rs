use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::types::{Priority, TaskId};

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    priority: Priority,
    seq: u64,
    task_id: TaskId,
}

// BinaryHeap is a max-heap; the "greatest" entry is the lowest priority value
// and, within a tier, the earliest arrival.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending tasks ordered by priority, FIFO within a priority.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many queued tasks will be served before this one.
    pub fn push(&mut self, task_id: TaskId, priority: Priority) -> usize {
        let ahead = self
            .heap
            .iter()
            .filter(|entry| entry.priority <= priority)
            .count();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            task_id,
        });
        ahead
    }

    pub fn pop(&mut self) -> Option<TaskId> {
        self.heap.pop().map(|entry| entry.task_id)
    }

    pub fn remove(&mut self, task_id: &TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|entry| &entry.task_id != task_id);
        self.heap.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_priority_value_first() {
        let mut queue = PendingQueue::new();
        queue.push("background".into(), Priority::BACKGROUND);
        queue.push("user".into(), Priority::USER);
        queue.push("emergency".into(), Priority::EMERGENCY);

        assert_eq!(queue.pop(), Some("emergency".into()));
        assert_eq!(queue.pop(), Some("user".into()));
        assert_eq!(queue.pop(), Some("background".into()));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PendingQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.push(name.into(), Priority::USER);
        }
        queue.push("urgent".into(), Priority::EMERGENCY);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        let expected: Vec<TaskId> = vec!["urgent".into(), "a".into(), "b".into(), "c".into(), "d".into()];
        assert_eq!(order, expected);
    }

    #[test]
    fn test_push_reports_tasks_ahead() {
        let mut queue = PendingQueue::new();
        assert_eq!(queue.push("a".into(), Priority::USER), 0);
        assert_eq!(queue.push("b".into(), Priority::BACKGROUND), 1);
        assert_eq!(queue.push("c".into(), Priority::USER), 1);
        assert_eq!(queue.push("d".into(), Priority::EMERGENCY), 0);
    }

    #[test]
    fn test_remove() {
        let mut queue = PendingQueue::new();
        queue.push("a".into(), Priority::USER);
        queue.push("b".into(), Priority::USER);

        assert!(queue.remove(&"a".into()));
        assert!(!queue.remove(&"a".into()));
        assert_eq!(queue.pop(), Some("b".into()));
        assert_eq!(queue.pop(), None);
    }
}
