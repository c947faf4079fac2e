//! Growable read/write staging buffer.
//!
//! A single contiguous region with three cursors, `read <= flush <= write`.
//! Bytes appended through a writable window stay invisible to the reader
//! until [`flush`](WireBuffer::flush) publishes them, which is what lets an
//! encoder that fails halfway be rolled back with
//! [`discard`](WireBuffer::discard) without corrupting the stream. The
//! region grows by doubling up to a configurable cap and is compacted (not
//! wrapped) once the read cursor moves far enough in.

use crate::{Error, Result};

/// Default window handed out when a writer gives no size hint.
const DEFAULT_WINDOW: usize = 4096;

/// Once the read cursor is past this many bytes, the next `confirm_read`
/// slides the live region back to the start of the allocation.
const COMPACT_THRESHOLD: usize = 64 * 1024;

/// Growable byte region with `read <= flush <= write` cursors.
pub struct WireBuffer {
    data: Vec<u8>,
    read: usize,
    flush: usize,
    write: usize,
    max_capacity: usize,
}

impl WireBuffer {
    /// Create a buffer that may grow up to `max_capacity` bytes.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            read: 0,
            flush: 0,
            write: 0,
            max_capacity,
        }
    }

    /// Bytes published and not yet consumed, `[read, flush)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.read..self.flush]
    }

    /// Bytes written but not yet published, `[flush, write)`.
    pub fn pending(&self) -> usize {
        self.write - self.flush
    }

    /// True when nothing is readable and nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Hand out a writable window of at least `hint` bytes (a default when
    /// zero). The window starts at the `write` cursor; nothing becomes
    /// visible until [`confirm_write`](Self::confirm_write).
    pub fn writable(&mut self, hint: usize) -> Result<&mut [u8]> {
        let want = if hint == 0 { DEFAULT_WINDOW } else { hint };
        self.ensure(want)?;
        Ok(&mut self.data[self.write..])
    }

    /// Commit `n` bytes of the last window.
    pub fn confirm_write(&mut self, n: usize) {
        debug_assert!(self.write + n <= self.data.len());
        self.write += n;
    }

    /// Publish everything written so far to the reader.
    pub fn flush(&mut self) {
        self.flush = self.write;
    }

    /// Consume `n` readable bytes.
    pub fn confirm_read(&mut self, n: usize) {
        debug_assert!(self.read + n <= self.flush);
        self.read += n;
        if self.read > COMPACT_THRESHOLD {
            self.compact();
        }
    }

    /// Drop everything between `flush` and `write`. Called when an encoder
    /// fails after partially filling the buffer.
    pub fn discard(&mut self) {
        self.write = self.flush;
    }

    /// Run a writer callback against a window, retrying with an at least
    /// doubled window whenever the callback reports zero progress. The
    /// callback returns the number of bytes it wrote; its bytes are
    /// committed only on success.
    pub fn write_with<F>(&mut self, hint: usize, mut f: F) -> Result<usize>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        let mut want = if hint == 0 { DEFAULT_WINDOW } else { hint };
        loop {
            let window = self.writable(want)?;
            let wrote = f(window)?;
            if wrote > 0 {
                self.confirm_write(wrote);
                return Ok(wrote);
            }
            // Zero progress: the window was too small for even one element.
            want = want
                .checked_mul(2)
                .ok_or_else(|| Error::Internal("write window overflow".into()))?;
        }
    }

    /// Append a slice. Convenience over `writable` + `confirm_write`.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let window = self.writable(bytes.len())?;
        window[..bytes.len()].copy_from_slice(bytes);
        self.confirm_write(bytes.len());
        Ok(())
    }

    fn ensure(&mut self, extra: usize) -> Result<()> {
        let needed = self.write + extra;
        if needed <= self.data.len() {
            return Ok(());
        }
        // Reclaim consumed space before allocating more.
        if self.read > 0 {
            self.compact();
        }
        let needed = self.write + extra;
        if needed <= self.data.len() {
            return Ok(());
        }
        let mut new_len = self.data.len().max(DEFAULT_WINDOW);
        while new_len < needed {
            new_len = new_len.saturating_mul(2);
        }
        if new_len > self.max_capacity {
            if needed > self.max_capacity {
                return Err(Error::Internal(format!(
                    "buffer limit exceeded: need {needed} bytes, cap is {}",
                    self.max_capacity
                )));
            }
            new_len = self.max_capacity;
        }
        self.data.resize(new_len, 0);
        Ok(())
    }

    fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        self.data.copy_within(self.read..self.write, 0);
        self.write -= self.read;
        self.flush -= self.read;
        self.read = 0;
    }
}
