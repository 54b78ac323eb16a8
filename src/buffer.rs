use std::io::{self, Write};

pub const DEFAULT_INITIAL_CAPACITY: usize = 1 << 20;
const GROWTH_CEILING: usize = 32 << 20;

/// Append-only byte sink with geometric growth.
///
/// Grows by `min(capacity, 32 MiB)` per step, rounding the new capacity up
/// to a step multiple large enough to hold the pending write. Reallocation
/// copies only the bytes written so far, which amortizes the cost for
/// documents of unknown final size.
pub struct GrowBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl GrowBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current write offset.
    pub fn position(&self) -> usize {
        self.len
    }

    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let required = self.len + bytes.len();
        if required > self.data.len() {
            self.grow(required);
        }
        self.data[self.len..required].copy_from_slice(bytes);
        self.len = required;
        bytes.len()
    }

    /// Returns exactly the written bytes.
    pub fn finalize(self) -> Vec<u8> {
        let mut data = self.data.into_vec();
        data.truncate(self.len);
        data
    }

    fn grow(&mut self, required: usize) {
        let step = self.data.len().min(GROWTH_CEILING);
        let shortfall = required - self.data.len();
        let steps = shortfall.div_ceil(step);
        let capacity = self.data.len() + steps * step;
        let mut data = vec![0u8; capacity].into_boxed_slice();
        data[..self.len].copy_from_slice(&self.data[..self.len]);
        self.data = data;
    }
}

impl Default for GrowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for GrowBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(GrowBuffer::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_tracks_position_and_finalize_is_exact() {
        let mut buffer = GrowBuffer::with_capacity(8);
        assert_eq!(buffer.write(b"abc"), 3);
        assert_eq!(buffer.position(), 3);
        assert_eq!(buffer.write(b"def"), 3);
        assert_eq!(buffer.position(), 6);
        assert_eq!(buffer.finalize(), b"abcdef".to_vec());
    }

    #[test]
    fn growth_doubles_small_buffers() {
        let mut buffer = GrowBuffer::with_capacity(4);
        buffer.write(b"12345");
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.finalize(), b"12345".to_vec());
    }

    #[test]
    fn growth_rounds_up_to_cover_large_pending_writes() {
        let mut buffer = GrowBuffer::with_capacity(4);
        let payload = vec![7u8; 23];
        buffer.write(&payload);
        // 4 + ceil((23 - 4) / 4) * 4 = 24.
        assert_eq!(buffer.capacity(), 24);
        assert_eq!(buffer.finalize(), payload);
    }

    #[test]
    fn io_write_appends_like_direct_write() {
        use std::io::Write as _;
        let mut buffer = GrowBuffer::with_capacity(2);
        buffer.write_all(b"hello ").expect("write");
        buffer.write_all(b"world").expect("write");
        assert_eq!(buffer.finalize(), b"hello world".to_vec());
    }
}
