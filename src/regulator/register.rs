//! Fixed-capacity FIFO history of recent captures.

use std::collections::VecDeque;

/// Ordered history with a hard capacity.
///
/// Appending to a full register evicts the oldest entry, so the register always
/// holds the most recent `capacity` items in insertion order. Clearing happens
/// only by dropping the register and building a new one.
#[derive(Debug, Clone)]
pub struct RollingRegister<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingRegister<T> {
    /// Creates an empty register holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "register capacity must be non-zero");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends at the back, evicting the front entry once full.
    pub fn append(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
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

    /// Oldest retained entry.
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Iterates current contents oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Current contents oldest-first.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_insertion_order() {
        let mut register = RollingRegister::new(3);
        register.append(1);
        register.append(2);
        assert_eq!(register.to_vec(), vec![1, 2]);
        assert_eq!(register.len(), 2);
    }

    #[test]
    fn test_full_register_evicts_oldest() {
        let mut register = RollingRegister::new(3);
        for i in 0..5 {
            register.append(i);
        }
        assert_eq!(register.len(), 3);
        assert_eq!(register.to_vec(), vec![2, 3, 4]);
        assert_eq!(register.front(), Some(&2));
    }

    #[test]
    fn test_capacity_one_keeps_newest() {
        let mut register = RollingRegister::new(1);
        register.append("a");
        register.append("b");
        assert_eq!(register.to_vec(), vec!["b"]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut register = RollingRegister::new(4);
        for i in 0..100 {
            register.append(i);
            assert!(register.len() <= 4);
        }
        assert_eq!(register.capacity(), 4);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = RollingRegister::<i32>::new(0);
    }
}
