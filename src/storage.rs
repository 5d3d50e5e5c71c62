//! Page storage layer.
//!
//! An index engine persists its nodes as pages: opaque byte payloads under
//! ids that the storage side allocates. Key components:
//!
//! - **PageId / PageRef**: identity of a page, and the target of a store
//!   (`PageRef::New` asks the backend for a fresh id)
//! - **StorageBackend**: adopter-supplied durable store, with
//!   `MemoryBackend` and `FileBackend` provided
//! - **PageBuffer**: cache of recently touched pages with LRU eviction and
//!   optional deferred writes
//!
//! Errors are returned per call as [`StorageError`]. Only
//! `BackendUnavailable` and I/O failures are fatal to a session.

pub mod backend;
pub mod buffer;
pub mod error;
pub mod page;

pub use backend::{
    shared, FileBackend, FileBackendConfig, MemoryBackend, SharedBackend, StorageBackend,
};
pub use buffer::{BufferStats, PageBuffer};
pub use error::{StorageError, StorageResult};
pub use page::{Page, PageId, PageRef};
