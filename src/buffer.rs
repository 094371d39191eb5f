//! Growable byte buffer used for per-connection recv/send paths.
//!
//! Shaped after `first/buffer.rs`'s read/write-offset design (`remaining`,
//! `remaining_mut`, `mark_read`, `mark_written`, `reserve`, `compact`), but
//! backed by a safe `Vec<u8>` rather than hand-rolled allocation, since
//! nothing here is hot enough to justify the raw-pointer version's risk.

use std::io::{self, Write};

/// A growable, contiguous byte buffer with independent read and write
/// cursors, compacted back toward the front once fully drained.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_offset: usize,
    desired_capacity: usize,
}

impl Buffer {
    /// Creates a new buffer that will shrink back to `desired_capacity`
    /// once fully drained.
    pub fn new(desired_capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(desired_capacity),
            read_offset: 0,
            desired_capacity,
        }
    }

    /// Bytes available to be read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_offset
    }

    /// Spare capacity available for writing without reallocating.
    pub fn remaining_mut(&self) -> usize {
        self.data.capacity() - self.data.len()
    }

    /// Whether there is no unread data.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reserves at least `additional` more bytes of write capacity.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    /// Appends `bytes` to the buffer, growing as needed.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Marks `amount` bytes as consumed from the front, compacting the
    /// backing storage once it is fully drained.
    pub fn mark_read(&mut self, amount: usize) {
        self.read_offset = self.data.len().min(self.read_offset + amount);
        self.compact();
    }

    /// The unread slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.read_offset..]
    }

    /// Drops the whole buffer back to empty, for use after a processor swap
    /// consumes the remaining bytes in one shot.
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_offset = 0;
        if self.data.capacity() > self.desired_capacity * 2 {
            self.data.shrink_to(self.desired_capacity);
        }
    }

    fn compact(&mut self) {
        if self.read_offset == 0 {
            return;
        }
        if self.read_offset == self.data.len() {
            self.clear();
            return;
        }
        self.data.drain(0..self.read_offset);
        self.read_offset = 0;
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_and_mark_read_round_trip() {
        let mut buf = Buffer::new(16);
        buf.extend(b"hello world");
        assert_eq!(buf.as_slice(), b"hello world");
        buf.mark_read(6);
        assert_eq!(buf.as_slice(), b"world");
        assert_eq!(buf.remaining(), 5);
    }

    #[test]
    fn fully_drained_buffer_compacts_to_empty() {
        let mut buf = Buffer::new(16);
        buf.extend(b"abc");
        buf.mark_read(3);
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), b"");
    }

    #[test]
    fn partial_drain_shifts_remaining_bytes_to_front() {
        let mut buf = Buffer::new(16);
        buf.extend(b"0123456789");
        buf.mark_read(4);
        buf.extend(b"ABC");
        assert_eq!(buf.as_slice(), b"456789ABC");
    }
}
