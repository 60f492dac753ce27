//! Property-based test generators and a reference cursor model.

use proptest::prelude::*;

/// One step of an interleaved I/O script.
#[derive(Debug, Clone)]
pub enum FileOp {
    /// Write the given bytes at the logical cursor.
    Write(Vec<u8>),
    /// Read up to the given number of bytes.
    Read(usize),
    /// Seek to an absolute offset, possibly past the end.
    Seek(u64),
    /// Truncate or extend the file to the given size.
    SetSize(u64),
    /// Query the size and compare it with the model.
    Size,
}

/// Strategy producing a single operation.
///
/// Writes dominate so scripts actually accumulate content; offsets and
/// lengths are kept small enough that operations frequently overlap.
pub fn file_op() -> impl Strategy<Value = FileOp> {
    prop_oneof![
        4 => proptest::collection::vec(any::<u8>(), 0..48).prop_map(FileOp::Write),
        3 => (0usize..48).prop_map(FileOp::Read),
        2 => (0u64..96).prop_map(FileOp::Seek),
        1 => (0u64..96).prop_map(FileOp::SetSize),
        1 => Just(FileOp::Size),
    ]
}

/// Strategy producing a whole interleaved script.
pub fn op_script() -> impl Strategy<Value = Vec<FileOp>> {
    proptest::collection::vec(file_op(), 1..64)
}

/// In-memory reference implementation of one logical cursor over a
/// growable byte vector.
///
/// This is what a transactional file must behave like once its buffer
/// coherency protocol is factored out: a single cursor, writes that
/// zero-fill gaps past the end, reads that stop at the end.
#[derive(Debug, Default)]
pub struct CursorModel {
    data: Vec<u8>,
    pos: usize,
}

impl CursorModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes the file should contain.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// The current size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Writes at the cursor, zero-filling any gap past the end.
    pub fn write(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let end = self.pos + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    /// Reads up to `len` bytes at the cursor and advances by what was
    /// actually available.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let start = self.pos.min(self.data.len());
        let end = (start + len).min(self.data.len());
        let out = self.data[start..end].to_vec();
        self.pos += out.len();
        out
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) {
        self.pos = offset as usize;
    }

    /// Truncates or zero-extends the contents. The cursor stays where it
    /// was, as with an OS truncate.
    pub fn set_size(&mut self, size: u64) {
        self.data.resize(size as usize, 0);
    }
}
