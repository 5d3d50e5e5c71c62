use crate::storage::page::PageId;
use std::fmt::Debug;

/// Eviction policy for the page buffer.
pub trait Replacer: Send + Sync + Debug {
    /// Record that a page was inserted, read or written.
    fn touch(&mut self, page_id: PageId);

    /// Stop tracking a page.
    fn remove(&mut self, page_id: PageId);

    /// The page that should be evicted next. Does not stop tracking it.
    fn victim(&self) -> Option<PageId>;

    /// Every tracked page, first eviction candidate first.
    fn eviction_order(&self) -> Vec<PageId>;

    /// Get the number of tracked pages.
    fn size(&self) -> usize;
}
