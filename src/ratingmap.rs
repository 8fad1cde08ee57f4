//! Reusable sparse accumulator keyed by cluster or block id.

use crate::defs::*;

/// Accumulates weights into a dense value array while remembering which
/// keys were touched, so iteration and clearing cost O(touched) instead of
/// O(capacity). One instance is kept per worker thread and reused across
/// nodes; `clear` must be called between uses.
pub struct RatingMap {
    values: Vec<EdgeWeight>,
    touched: Vec<NodeId>,
}

impl RatingMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity],
            touched: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of distinct keys touched since the last clear.
    pub fn len(&self) -> usize {
        self.touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    #[inline]
    pub fn add(&mut self, key: NodeId, weight: EdgeWeight) {
        let slot = &mut self.values[key as usize];
        if *slot == 0 {
            self.touched.push(key);
        }
        *slot += weight;
    }

    #[inline]
    pub fn get(&self, key: NodeId) -> EdgeWeight {
        self.values[key as usize]
    }

    pub fn entries(&self) -> impl Iterator<Item = (NodeId, EdgeWeight)> + '_ {
        self.touched.iter().map(|&key| (key, self.values[key as usize]))
    }

    /// The touched key with the maximum value. Ties resolve to the first
    /// touched key; callers that need random tie-breaking scan `entries`.
    pub fn argmax(&self) -> Option<NodeId> {
        self.touched
            .iter()
            .copied()
            .max_by_key(|&key| self.values[key as usize])
    }

    pub fn clear(&mut self) {
        for &key in &self.touched {
            self.values[key as usize] = 0;
        }
        self.touched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_clears() {
        let mut map = RatingMap::new(8);
        map.add(3, 5);
        map.add(1, 2);
        map.add(3, 1);
        assert_eq!(map.get(3), 6);
        assert_eq!(map.get(1), 2);
        assert_eq!(map.len(), 2);

        let mut entries: Vec<_> = map.entries().collect();
        entries.sort();
        assert_eq!(entries, vec![(1, 2), (3, 6)]);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(3), 0);
        map.add(3, 1);
        assert_eq!(map.get(3), 1);
    }

    #[test]
    fn argmax_prefers_heaviest() {
        let mut map = RatingMap::new(4);
        assert_eq!(map.argmax(), None);
        map.add(0, 1);
        map.add(2, 4);
        map.add(1, 3);
        assert_eq!(map.argmax(), Some(2));
    }
}
