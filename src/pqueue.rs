//! Indexed max-priority queue used by the FM refiners and the balancer.

use crate::defs::*;

#[derive(Clone, Copy, Default)]
struct Entry {
    key: EdgeWeight,
    node: NodeId,
}

/// Binary max-heap over node ids augmented with a locator array, so a
/// node's key can be updated or the node removed in O(log n) after
/// insertion. Keys are gains; the top is the highest-gain node.
pub struct IndexedPriorityQueue {
    len: usize,
    heap: Vec<Entry>,
    locator: Vec<isize>,
}

impl IndexedPriorityQueue {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            len: 0,
            heap: vec![Entry::default(); max_nodes],
            locator: vec![-1; max_nodes],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.locator[node as usize] != -1
    }

    /// Clears the queue in O(len).
    pub fn reset(&mut self) {
        for i in (0..self.len).rev() {
            self.locator[self.heap[i].node as usize] = -1;
        }
        self.len = 0;
    }

    pub fn insert(&mut self, node: NodeId, key: EdgeWeight) {
        debug_assert!(!self.contains(node));
        let mut i = self.len;
        self.len += 1;
        while i > 0 {
            let parent = (i - 1) >> 1;
            if key > self.heap[parent].key {
                self.heap[i] = self.heap[parent];
                self.locator[self.heap[i].node as usize] = i as isize;
                i = parent;
            } else {
                break;
            }
        }
        self.heap[i] = Entry { key, node };
        self.locator[node as usize] = i as isize;
        debug_assert!(self.check_heap());
    }

    pub fn delete(&mut self, node: NodeId) {
        debug_assert!(self.contains(node));
        let i = self.locator[node as usize] as usize;
        self.locator[node as usize] = -1;
        self.len -= 1;
        if i < self.len {
            let moved = self.heap[self.len];
            self.sift(i, moved);
        }
        debug_assert!(self.check_heap());
    }

    pub fn update(&mut self, node: NodeId, key: EdgeWeight) {
        debug_assert!(self.contains(node));
        let i = self.locator[node as usize] as usize;
        if self.heap[i].key == key {
            return;
        }
        self.sift(i, Entry { key, node });
        debug_assert!(self.check_heap());
    }

    /// Removes and returns the highest-gain node.
    pub fn pop(&mut self) -> Option<NodeId> {
        if self.len == 0 {
            return None;
        }
        let top = self.heap[0].node;
        self.locator[top as usize] = -1;
        self.len -= 1;
        if self.len > 0 {
            let moved = self.heap[self.len];
            self.sift(0, moved);
        }
        debug_assert!(self.check_heap());
        Some(top)
    }

    pub fn peek(&self) -> Option<NodeId> {
        (self.len > 0).then(|| self.heap[0].node)
    }

    pub fn peek_key(&self) -> Option<EdgeWeight> {
        (self.len > 0).then(|| self.heap[0].key)
    }

    pub fn key_of(&self, node: NodeId) -> EdgeWeight {
        debug_assert!(self.contains(node));
        self.heap[self.locator[node as usize] as usize].key
    }

    /// Places `entry` at position `i`, restoring the heap order by moving
    /// it up or down as needed.
    fn sift(&mut self, mut i: usize, entry: Entry) {
        // filter up
        while i > 0 {
            let parent = (i - 1) >> 1;
            if entry.key > self.heap[parent].key {
                self.heap[i] = self.heap[parent];
                self.locator[self.heap[i].node as usize] = i as isize;
                i = parent;
            } else {
                break;
            }
        }
        // filter down
        loop {
            let mut child = 2 * i + 1;
            if child >= self.len {
                break;
            }
            if child + 1 < self.len && self.heap[child + 1].key > self.heap[child].key {
                child += 1;
            }
            if self.heap[child].key > entry.key {
                self.heap[i] = self.heap[child];
                self.locator[self.heap[i].node as usize] = i as isize;
                i = child;
            } else {
                break;
            }
        }
        self.heap[i] = entry;
        self.locator[entry.node as usize] = i as isize;
    }

    fn check_heap(&self) -> bool {
        if self.len == 0 {
            return true;
        }
        assert_eq!(self.locator[self.heap[0].node as usize], 0);
        for i in 1..self.len {
            assert_eq!(self.locator[self.heap[i].node as usize], i as isize);
            assert!(self.heap[i].key <= self.heap[(i - 1) / 2].key);
        }
        let live = self.locator.iter().filter(|&&l| l != -1).count();
        assert_eq!(live, self.len);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn in_order() {
        let mut pq = IndexedPriorityQueue::new(10);
        for x in 0..10u32 {
            pq.insert(x, x as EdgeWeight);
        }
        let mut expect = (0..10u32).rev();
        while let Some(v) = pq.pop() {
            assert_eq!(Some(v), expect.next());
        }
        assert_eq!(expect.next(), None);
    }

    #[test]
    fn random_order_matches_std() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut pq = IndexedPriorityQueue::new(100);
        let mut truth = BinaryHeap::new();

        let mut keys: Vec<EdgeWeight> = (0..100).collect();
        rng.shuffle(&mut keys);
        for (node, &key) in keys.iter().enumerate() {
            pq.insert(node as NodeId, key);
            truth.push(key);
        }
        for _ in 0..100 {
            assert_eq!(pq.peek_key(), truth.peek().copied());
            pq.pop();
            truth.pop();
        }
    }

    #[test]
    fn random_order_with_removes() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut pq = IndexedPriorityQueue::new(100);
        let mut truth = BinaryHeap::new();

        let mut keys: Vec<EdgeWeight> = (0..100).collect();
        rng.shuffle(&mut keys);
        for (node, &key) in keys.iter().enumerate() {
            pq.insert(node as NodeId, key);
            if node >= 35 {
                truth.push(key);
            }
        }
        for node in 0..35u32 {
            pq.delete(node);
        }
        for _ in 0..65 {
            assert_eq!(pq.peek_key(), truth.peek().copied());
            pq.pop();
            truth.pop();
        }
        assert!(pq.is_empty());
    }

    #[test]
    fn updates_reorder() {
        let mut pq = IndexedPriorityQueue::new(4);
        for x in 0..4u32 {
            pq.insert(x, 0);
        }
        pq.update(2, 10);
        pq.update(0, 5);
        pq.update(2, -1);
        assert_eq!(pq.pop(), Some(0));
        assert_eq!(pq.key_of(2), -1);
    }
}
