//! Double-buffered storage.
//!
//! A [`PingPong`] holds two equally sized slices and a flag naming which one
//! is the read side. A pass borrows the read side immutably and the write
//! side mutably at the same time via [`PingPong::split`], so the borrow
//! checker rules out a pass reading what it writes. [`PingPong::swap`] flips
//! the flag; no data moves.

/// Two buffers of `T` with an O(1) read/write swap.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPong<T> {
    a: Vec<T>,
    b: Vec<T>,
    /// Which buffer is currently the "read" buffer (false = A, true = B).
    read_is_b: bool,
}

impl<T: Clone> PingPong<T> {
    /// Both buffers filled with `len` copies of `value`.
    pub fn new(len: usize, value: T) -> Self {
        Self {
            a: vec![value.clone(); len],
            b: vec![value; len],
            read_is_b: false,
        }
    }

    /// Overwrite both buffers with `value`.
    pub fn fill(&mut self, value: T) {
        self.a.fill(value.clone());
        self.b.fill(value);
    }
}

impl<T> PingPong<T> {
    /// Elements per buffer.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// True when the buffers hold no elements.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// The current (read) buffer.
    pub fn read(&self) -> &[T] {
        if self.read_is_b {
            &self.b
        } else {
            &self.a
        }
    }

    /// Mutable access to the current buffer, for external writes between
    /// passes (initial conditions, impulses applied in place by the owner).
    pub fn read_mut(&mut self) -> &mut [T] {
        if self.read_is_b {
            &mut self.b
        } else {
            &mut self.a
        }
    }

    /// The next (write) buffer.
    pub fn write(&self) -> &[T] {
        if self.read_is_b {
            &self.a
        } else {
            &self.b
        }
    }

    /// Read side and write side, borrowed together.
    pub fn split(&mut self) -> (&[T], &mut [T]) {
        if self.read_is_b {
            (&self.b, &mut self.a)
        } else {
            (&self.a, &mut self.b)
        }
    }

    /// Make the write buffer current. Pointer flip, no copy.
    #[inline]
    pub fn swap(&mut self) {
        self.read_is_b = !self.read_is_b;
    }

    /// Whether buffer B is currently the read side.
    pub fn read_is_b(&self) -> bool {
        self.read_is_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_disjoint() {
        let mut buf = PingPong::new(4, 0u32);
        {
            let (read, write) = buf.split();
            assert_eq!(read, &[0, 0, 0, 0]);
            write[2] = 7;
        }
        // Writes land on the write side only.
        assert_eq!(buf.read(), &[0, 0, 0, 0]);
        assert_eq!(buf.write(), &[0, 0, 7, 0]);
    }

    #[test]
    fn test_swap_exchanges_without_copy() {
        let mut buf = PingPong::new(3, 1.0f32);
        buf.split().1[0] = 5.0;
        let old_write = buf.write().as_ptr();
        let old_read = buf.read().as_ptr();
        buf.swap();
        assert_eq!(buf.read().as_ptr(), old_write);
        assert_eq!(buf.write().as_ptr(), old_read);
        assert_eq!(buf.read()[0], 5.0);
        assert!(buf.read_is_b());
    }

    #[test]
    fn test_double_swap_restores() {
        let mut buf = PingPong::new(2, 'x');
        let read = buf.read().as_ptr();
        buf.swap();
        buf.swap();
        assert_eq!(buf.read().as_ptr(), read);
    }

    #[test]
    fn test_fill_resets_both() {
        let mut buf = PingPong::new(2, 0i32);
        buf.split().1[1] = 3;
        buf.read_mut()[0] = 4;
        buf.fill(9);
        assert_eq!(buf.read(), &[9, 9]);
        assert_eq!(buf.write(), &[9, 9]);
    }
}
