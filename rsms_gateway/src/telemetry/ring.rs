use std::collections::VecDeque;

/// Last `capacity` realtime samples, oldest first. Kept regardless of send
/// outcome so an alarm can backfill recent history.
#[derive(Debug, Clone)]
pub struct RetentionRing {
    capacity: usize,
    items: VecDeque<Vec<u8>>,
}

impl RetentionRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Push, evicting the oldest sample when full. Returns what was evicted.
    pub fn push(&mut self, sample: Vec<u8>) -> Option<Vec<u8>> {
        if self.capacity == 0 {
            return Some(sample);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(sample);
        evicted
    }

    /// Copy of the contents in chronological order.
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_last_three_of_five() {
        let mut ring = RetentionRing::new(3);
        for label in 1u8..=5 {
            ring.push(vec![label]);
        }
        assert_eq!(ring.to_vec(), vec![vec![3], vec![4], vec![5]]);
    }

    #[test]
    fn reports_evicted_sample() {
        let mut ring = RetentionRing::new(1);
        assert_eq!(ring.push(vec![1]), None);
        assert_eq!(ring.push(vec![2]), Some(vec![1]));
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let mut ring = RetentionRing::new(0);
        assert_eq!(ring.push(vec![9]), Some(vec![9]));
        assert!(ring.is_empty());
    }

    proptest! {
        #[test]
        fn prop_retains_suffix(cap in 1usize..16, n in 0usize..64) {
            let mut ring = RetentionRing::new(cap);
            for i in 0..n {
                ring.push((i as u32).to_be_bytes().to_vec());
            }
            let expected: Vec<Vec<u8>> = (n.saturating_sub(cap)..n)
                .map(|i| (i as u32).to_be_bytes().to_vec())
                .collect();
            prop_assert_eq!(ring.to_vec(), expected);
        }
    }
}
