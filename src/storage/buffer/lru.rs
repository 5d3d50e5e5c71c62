use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{BTreeMap, HashMap};

/// Least-recently-touched eviction.
///
/// Every touch stamps the page with a fresh sequence number, so no two pages
/// ever share a recency and the victim is always unique.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Pages ordered by last touch (least recently touched first).
    by_sequence: BTreeMap<u64, PageId>,
    /// Last touch sequence of each tracked page.
    last_touched: HashMap<PageId, u64>,
    next_sequence: u64,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last touch of `page_id`, if tracked.
    pub fn last_touched(&self, page_id: PageId) -> Option<u64> {
        self.last_touched.get(&page_id).copied()
    }
}

impl Replacer for LruReplacer {
    fn touch(&mut self, page_id: PageId) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if let Some(previous) = self.last_touched.insert(page_id, sequence) {
            self.by_sequence.remove(&previous);
        }
        self.by_sequence.insert(sequence, page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(sequence) = self.last_touched.remove(&page_id) {
            self.by_sequence.remove(&sequence);
        }
    }

    fn victim(&self) -> Option<PageId> {
        self.by_sequence.values().next().copied()
    }

    fn eviction_order(&self) -> Vec<PageId> {
        self.by_sequence.values().copied().collect()
    }

    fn size(&self) -> usize {
        self.last_touched.len()
    }
}
