//! Fixed-capacity ring buffer
//!
//! Slots live in a preallocated arena and `head` points at the oldest entry.
//! Pushing into a full buffer overwrites the oldest entry and hands it back to
//! the caller, which drops it (zeroizing any secret it carries).

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    /// Append a value, returning the evicted oldest value when full
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.len < self.capacity() {
            let idx = self.slot(self.len);
            self.slots[idx] = Some(value);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(value);
            self.head = self.slot(1);
            evicted
        }
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.slot(i)].as_ref())
    }

    /// Iterate oldest first, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        let (tail, front) = self.slots.split_at_mut(self.head);
        front
            .iter_mut()
            .chain(tail.iter_mut())
            .take(self.len)
            .filter_map(Option::as_mut)
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.iter().find(|v| pred(v))
    }

    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.iter_mut().find(|v| pred(v))
    }

    /// Remove every entry, returning them oldest first
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for i in 0..self.len {
            let idx = self.slot(i);
            if let Some(value) = self.slots[idx].take() {
                out.push(value);
            }
        }
        self.head = 0;
        self.len = 0;
        out
    }

    /// Keep only entries matching `keep`, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for value in self.drain() {
            if keep(&value) {
                self.push(value);
            }
        }
    }

    pub fn clear(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_iter_mut_follows_logical_order() {
        let mut ring = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        let seen: Vec<i32> = ring.iter_mut().map(|v| *v).collect();
        assert_eq!(seen, vec![2, 3, 4]);
        if let Some(v) = ring.find_mut(|v| *v == 3) {
            *v = 30;
        }
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 30, 4]);
    }

    #[test]
    fn test_retain_and_drain() {
        let mut ring = RingBuffer::new(4);
        for i in 0..6 {
            ring.push(i);
        }
        ring.retain(|v| v % 2 == 0);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(ring.drain(), vec![2, 4]);
        assert!(ring.is_empty());
        ring.push(9);
        assert_eq!(ring.find(|v| *v == 9), Some(&9));
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push('a');
        assert_eq!(ring.push('b'), Some('a'));
    }
}
