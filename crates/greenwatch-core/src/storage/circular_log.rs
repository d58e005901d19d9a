//! Fixed-capacity ring log with a resizable logical window.

/// Ring store of `N` slots of which only the first `size` are in use.
///
/// Writes never fail: once `size` entries are pending, a write overwrites the
/// oldest undrained entry and the read cursor moves past it, so draining always
/// yields entries oldest to newest. Resizing moves entries within the existing
/// array; the storage itself is allocated once.
#[derive(Debug, Clone)]
pub struct CircularLog<T, const N: usize> {
    data: [T; N],
    write: usize,
    read: usize,
    len: usize,
    size: usize,
}

impl<T: Copy + Default, const N: usize> CircularLog<T, N> {
    /// Create a log with a logical window of `size` slots (clamped to `1..=N`).
    pub fn new(size: usize) -> Self {
        const { assert!(N > 0, "a circular log needs at least one slot") };
        Self {
            data: [T::default(); N],
            write: 0,
            read: 0,
            len: 0,
            size: size.clamp(1, N),
        }
    }

    /// Append a value, overwriting the oldest pending entry when the window is full.
    pub fn write(&mut self, value: T) {
        self.data[self.write] = value;
        self.write = (self.write + 1) % self.size;
        if self.len == self.size {
            self.read = (self.read + 1) % self.size;
        } else {
            self.len += 1;
        }
    }

    /// Drain the oldest pending entry.
    pub fn read(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.data[self.read];
        self.read = (self.read + 1) % self.size;
        self.len -= 1;
        Some(value)
    }

    /// Change the logical window, keeping the newest pending entries that fit.
    ///
    /// Returns the size actually applied.
    pub fn resize(&mut self, size: usize) -> usize {
        let size = size.clamp(1, N);
        if size == self.size {
            return size;
        }

        // Oldest entry to slot 0, then drop whatever no longer fits
        self.data[..self.size].rotate_left(self.read);
        if self.len > size {
            let dropped = self.len - size;
            self.data[..self.len].rotate_left(dropped);
            self.len = size;
        }

        self.size = size;
        self.read = 0;
        self.write = self.len % size;
        size
    }

    /// Iterate pending entries oldest to newest without draining them.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.data[(self.read + i) % self.size])
    }

    /// Number of pending entries.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current logical window.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Allocated slots.
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_empty_returns_none() {
        let mut log = CircularLog::<i32, 4>::new(4);
        assert_eq!(log.read(), None);
        assert!(log.is_empty());
    }

    #[test]
    fn test_fifo_across_wraparound() {
        for offset in 0..5 {
            let mut log = CircularLog::<i32, 8>::new(5);

            // Move both cursors around the window before the real check
            for i in 0..offset {
                log.write(-i);
                log.read();
            }

            for i in 0..5 {
                log.write(i);
            }
            let drained: Vec<i32> = core::iter::from_fn(|| log.read()).collect();
            assert_eq!(drained, vec![0, 1, 2, 3, 4], "offset {}", offset);
        }
    }

    #[test]
    fn test_write_past_window_overwrites_oldest() {
        let mut log = CircularLog::<u32, 8>::new(3);
        for i in 1..=5 {
            log.write(i);
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(log.read(), Some(3));
        assert_eq!(log.read(), Some(4));
        assert_eq!(log.read(), Some(5));
        assert_eq!(log.read(), None);
    }

    #[test]
    fn test_shrink_takes_effect_on_next_write() {
        let mut log = CircularLog::<u32, 6>::new(6);
        log.resize(2);

        log.write(10);
        log.write(20);
        log.write(30);

        assert_eq!(log.size(), 2);
        assert_eq!(log.capacity(), 6);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![20, 30]);
    }

    #[test]
    fn test_shrink_keeps_newest_entries() {
        let mut log = CircularLog::<u32, 5>::new(5);
        for i in 0..7 {
            log.write(i);
        }
        // Pending: 2..=6, read cursor sits mid-array
        assert_eq!(log.resize(3), 3);

        assert_eq!(log.iter().collect::<Vec<_>>(), vec![4, 5, 6]);
        log.write(7);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![5, 6, 7]);
    }

    #[test]
    fn test_grow_within_capacity_keeps_entries() {
        let mut log = CircularLog::<u32, 6>::new(2);
        log.write(1);
        log.write(2);
        log.write(3);

        assert_eq!(log.resize(4), 4);
        log.write(4);
        log.write(5);

        assert_eq!(log.iter().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_resize_is_clamped_to_capacity() {
        let mut log = CircularLog::<u8, 4>::new(2);
        assert_eq!(log.resize(100), 4);
        assert_eq!(log.resize(0), 1);
        assert_eq!(CircularLog::<u8, 4>::new(9).size(), 4);
    }
}
