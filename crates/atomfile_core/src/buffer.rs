//! Fixed-capacity buffers for multiplexing one descriptor cursor.
//!
//! A transactional file routes reads and writes through separate buffers
//! over a single descriptor. The read buffer may pull the descriptor
//! ahead of the logical cursor; the write buffer may hold bytes the
//! descriptor has not seen yet. At most one of the two holds
//! unsynchronized state at any time; the handle restores a single
//! logical cursor before switching directions.

use std::fs::File;
use std::io::{self, Read, Write};

/// Buffers bytes read ahead from the descriptor.
pub(crate) struct ReadBuffer {
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl ReadBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
        }
    }

    /// Bytes read from the descriptor but not yet handed to the caller.
    ///
    /// This is exactly how far the descriptor is ahead of the logical
    /// cursor.
    pub(crate) fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    /// Discards all buffered bytes.
    ///
    /// The caller is responsible for seeking the descriptor back by
    /// [`buffered`](Self::buffered) bytes first.
    pub(crate) fn clear(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }

    /// Reads into `out`, refilling from `file` when the buffer is empty.
    ///
    /// Reads larger than the buffer bypass it entirely.
    pub(crate) fn read(&mut self, file: &mut File, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.buffered() == 0 {
            if out.len() >= self.buf.len() {
                return file.read(out);
            }
            self.pos = 0;
            self.filled = file.read(&mut self.buf)?;
            if self.filled == 0 {
                return Ok(0);
            }
        }
        let n = self.buffered().min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Accumulates writes before pushing them to the descriptor.
pub(crate) struct WriteBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl WriteBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes accepted from the caller but not yet written to the
    /// descriptor.
    pub(crate) fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends `data`, spilling to `file` when the buffer fills.
    ///
    /// Writes at least as large as the buffer go straight to the
    /// descriptor after a flush.
    pub(crate) fn write(&mut self, file: &mut File, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.capacity {
            self.flush(file)?;
        }
        if data.len() >= self.capacity {
            file.write_all(data)?;
        } else {
            self.buf.extend_from_slice(data);
        }
        Ok(data.len())
    }

    /// Pushes all buffered bytes to `file`.
    pub(crate) fn flush(&mut self, file: &mut File) -> io::Result<()> {
        if !self.buf.is_empty() {
            file.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}
