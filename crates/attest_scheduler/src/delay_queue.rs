//! Time-keyed binary min-heap.
//!
//! Keys are start times in ms since Unix epoch. Equal keys pop in insertion
//! order. The queue knows nothing about what it stores.

#[derive(Clone, Debug)]
struct Node<T> {
    key: u64,
    seq: u64,
    value: T,
}

impl<T> Node<T> {
    const fn before(&self, other: &Self) -> bool {
        self.key < other.key || (self.key == other.key && self.seq < other.seq)
    }
}

#[derive(Clone, Debug)]
pub struct DelayQueue<T> {
    heap: Vec<Node<T>>,
    next_seq: u64,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { heap: Vec::new(), next_seq: 0 }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Smallest pending key.
    #[must_use]
    pub fn peek_key(&self) -> Option<u64> {
        self.heap.first().map(|n| n.key)
    }

    pub fn push(&mut self, value: T, key: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Node { key, seq, value });
        let mut i = self.heap.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.heap[i].before(&self.heap[parent]) {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    /// Remove and return the minimum-key item.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        let n = self.heap.len();
        let mut i = 0usize;
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            if right < n && self.heap[right].before(&self.heap[left]) {
                child = right;
            }
            if !self.heap[child].before(&self.heap[i]) {
                break;
            }
            self.heap.swap(i, child);
            i = child;
        }
        Some(top.value)
    }

    /// Pop the minimum item only if its key is `<= now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<T> {
        match self.peek_key() {
            Some(k) if k <= now_ms => self.pop(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_key_order() {
        let mut q = DelayQueue::new();
        for (v, k) in [("c", 30), ("a", 10), ("d", 40), ("b", 20), ("e", 5)] {
            q.push(v, k);
        }
        assert_eq!(q.peek_key(), Some(5));
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, vec!["e", "a", "b", "c", "d"]);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut q = DelayQueue::new();
        for v in 0..8 {
            q.push(v, 100);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn pop_due_respects_now() {
        let mut q = DelayQueue::new();
        q.push("later", 200);
        q.push("soon", 100);
        assert_eq!(q.pop_due(99), None);
        assert_eq!(q.pop_due(100), Some("soon"));
        assert_eq!(q.pop_due(150), None);
        assert_eq!(q.len(), 1);
    }
}
