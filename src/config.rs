//! Session configuration.

/// Default number of pages kept by the buffering layer.
pub const DEFAULT_BUFFERING_CAPACITY: usize = 10;

/// Settings consumed when a session is opened on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Route requests through a page buffer. When false every request goes
    /// straight to the backend.
    pub buffering: bool,
    /// Propagate every store to the backend immediately.
    pub writethrough: bool,
    /// Maximum number of buffered pages before least-recently-touched
    /// eviction kicks in.
    pub buffering_capacity: usize,
    /// Discard whatever the backend already holds when the session opens.
    pub overwrite: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            buffering: true,
            writethrough: false,
            buffering_capacity: DEFAULT_BUFFERING_CAPACITY,
            overwrite: false,
        }
    }
}

impl SessionConfig {
    /// Configuration that sends every request straight to the backend.
    pub fn passthrough() -> Self {
        SessionConfig {
            buffering: false,
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, buffering_capacity: usize) -> Self {
        self.buffering_capacity = buffering_capacity;
        self
    }

    pub fn with_writethrough(mut self, writethrough: bool) -> Self {
        self.writethrough = writethrough;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Whether stores may stay in memory past the call that made them.
    pub fn defers_writes(&self) -> bool {
        self.buffering && !self.writethrough && self.buffering_capacity > 0
    }
}
