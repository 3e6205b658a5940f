use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Latency-sensitive lookups; may use the reserved concurrency slot.
    High,
    Normal,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => f.write_str("high"),
            Priority::Normal => f.write_str("normal"),
        }
    }
}

/// Two-tier FIFO: every High item precedes every Normal item, insertion order
/// is kept within a tier.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    items: VecDeque<(Priority, T)>,
    high: usize,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            high: 0,
        }
    }

    pub fn push(&mut self, priority: Priority, item: T) {
        match priority {
            Priority::High => {
                // Splice right behind the last queued High item.
                self.items.insert(self.high, (priority, item));
                self.high += 1;
            }
            Priority::Normal => self.items.push_back((priority, item)),
        }
    }

    pub fn front(&self) -> Option<(Priority, &T)> {
        self.items.front().map(|(priority, item)| (*priority, item))
    }

    pub fn pop_front(&mut self) -> Option<(Priority, T)> {
        let popped = self.items.pop_front()?;
        if popped.0 == Priority::High {
            self.high -= 1;
        }
        Some(popped)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut PriorityQueue<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| queue.pop_front().map(|(_, item)| item)).collect()
    }

    #[test]
    fn high_items_jump_ahead_of_normal_ones() {
        let mut queue = PriorityQueue::new();
        queue.push(Priority::Normal, "n1");
        queue.push(Priority::Normal, "n2");
        queue.push(Priority::High, "h1");
        queue.push(Priority::Normal, "n3");
        queue.push(Priority::High, "h2");

        assert_eq!(queue.front().map(|(p, item)| (p, *item)), Some((Priority::High, "h1")));
        assert_eq!(drain(&mut queue), vec!["h1", "h2", "n1", "n2", "n3"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn high_tier_stays_fifo_across_pops() {
        let mut queue = PriorityQueue::new();
        queue.push(Priority::High, "h1");
        queue.push(Priority::Normal, "n1");
        queue.push(Priority::High, "h2");

        assert_eq!(queue.pop_front().map(|(_, item)| item), Some("h1"));
        queue.push(Priority::High, "h3");
        queue.push(Priority::Normal, "n2");

        assert_eq!(queue.len(), 4);
        assert_eq!(drain(&mut queue), vec!["h2", "h3", "n1", "n2"]);
    }
}
