//! Handle configuration.

/// Configuration for opening or creating a transactional file.
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Capacity in bytes of the read and write buffers.
    pub buffer_capacity: usize,

    /// Maximum number of temporary names tried before giving up with
    /// `CreateExhausted`.
    pub max_create_attempts: u32,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            max_create_attempts: 100,
        }
    }
}

impl FileOptions {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read/write buffer capacity in bytes.
    ///
    /// A capacity of zero is treated as one byte.
    #[must_use]
    pub const fn buffer_capacity(mut self, value: usize) -> Self {
        self.buffer_capacity = value;
        self
    }

    /// Sets how many temporary names are tried before giving up.
    #[must_use]
    pub const fn max_create_attempts(mut self, value: u32) -> Self {
        self.max_create_attempts = value;
        self
    }
}
