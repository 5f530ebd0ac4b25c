use std::cmp::Reverse;
use std::collections::HashMap;

use priority_queue::PriorityQueue;
use tokio::time::Instant;

/// Key type for the priority queue (must be Hash + Eq).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UrlKey(String);

/// Delay-ordered queue of items awaiting retry. The earliest due entry
/// sits on top; nothing is dispatchable before its deadline. Scheduling
/// the same URL again replaces the previous entry.
pub struct RetryQueue<T> {
    queue: PriorityQueue<UrlKey, Reverse<Instant>>,
    tasks: HashMap<String, T>,
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RetryQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            tasks: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, url: String, task: T, due: Instant) {
        self.tasks.insert(url.clone(), task);
        self.queue.push(UrlKey(url), Reverse(due));
    }

    /// Deadline of the earliest entry, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.peek().map(|(_, Reverse(due))| *due)
    }

    /// Remove and return everything due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        loop {
            let ready = matches!(self.queue.peek(), Some((_, Reverse(at))) if *at <= now);
            if !ready {
                break;
            }
            if let Some((key, _)) = self.queue.pop() {
                if let Some(task) = self.tasks.remove(&key.0) {
                    due.push(task);
                }
            }
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pops_in_deadline_order() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.schedule("b".into(), "b", now + Duration::from_millis(20));
        queue.schedule("a".into(), "a", now + Duration::from_millis(10));
        queue.schedule("c".into(), "c", now + Duration::from_millis(30));

        assert_eq!(queue.next_due(), Some(now + Duration::from_millis(10)));
        let due = queue.pop_due(now + Duration::from_millis(25));
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn nothing_pops_before_its_deadline() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.schedule("a".into(), "a", now + Duration::from_secs(60));
        assert!(queue.pop_due(now).is_empty());
        assert!(!queue.is_empty());
    }

    #[test]
    fn rescheduling_replaces_the_entry() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.schedule("a".into(), 1u32, now + Duration::from_millis(5));
        queue.schedule("a".into(), 2u32, now + Duration::from_millis(50));

        assert!(queue.pop_due(now + Duration::from_millis(10)).is_empty());
        assert_eq!(queue.pop_due(now + Duration::from_millis(60)), vec![2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_empties_everything() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.schedule("a".into(), "a", now);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.next_due(), None);
    }
}
