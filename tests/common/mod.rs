#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::Bytes;
use pagestore::storage::{
    MemoryBackend, PageId, PageRef, StorageBackend, StorageError, StorageResult,
};
use pagestore::Session;
use serde::{Deserialize, Serialize};

/// Memory backend that counts every call reaching it.
#[derive(Debug, Default)]
pub struct CountingBackend {
    pub inner: MemoryBackend,
    pub creates: usize,
    pub destroys: usize,
    pub loads: usize,
    pub stores: usize,
    pub deletes: usize,
    /// When set, every store fails as if the device went away.
    pub fail_stores: bool,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.loads + self.stores + self.deletes
    }
}

impl StorageBackend for CountingBackend {
    fn create(&mut self) -> StorageResult<()> {
        self.creates += 1;
        self.inner.create()
    }

    fn destroy(&mut self) -> StorageResult<()> {
        self.destroys += 1;
        self.inner.destroy()
    }

    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        self.loads += 1;
        self.inner.load(page_id)
    }

    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId> {
        self.stores += 1;
        if self.fail_stores {
            return Err(StorageError::unavailable("device went away"));
        }
        self.inner.store(page, data)
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        self.deletes += 1;
        self.inner.delete(page_id)
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.inner.clear()
    }

    fn page_count(&self) -> usize {
        self.inner.page_count()
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: [min_x, min_y],
            max: [max_x, max_y],
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        (0..2).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    pub fn contains(&self, other: &Rect) -> bool {
        (0..2).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: [self.min[0].min(other.min[0]), self.min[1].min(other.min[1])],
            max: [self.max[0].max(other.max[0]), self.max[1].max(other.max[1])],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    directory: PageId,
    item_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Directory {
    leaves: Vec<(PageId, Rect)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Leaf {
    items: Vec<(u64, Rect)>,
}

const LEAF_CAPACITY: usize = 4;

/// Two-level toy spatial index standing in for an external engine.
///
/// Page 0 holds a header, the header points at a directory page and the
/// directory lists leaf pages with their bounding boxes.
pub struct ToyIndex<B: StorageBackend> {
    session: Session<B>,
    header_id: PageId,
}

impl<B: StorageBackend> ToyIndex<B> {
    /// Initialise an empty index, writing its bookkeeping pages.
    pub fn create(mut session: Session<B>) -> Result<Self> {
        let placeholder = Header {
            directory: PageId(0),
            item_count: 0,
        };
        let header_id = session.store(PageRef::New, bincode::serialize(&placeholder)?)?;
        let empty = Directory::default();
        let directory = session.store(PageRef::New, bincode::serialize(&empty)?)?;

        let header = Header {
            directory,
            item_count: 0,
        };
        session.store(header_id, bincode::serialize(&header)?)?;

        Ok(Self { session, header_id })
    }

    /// Attach to an index previously written to the backend.
    pub fn open(session: Session<B>, header_id: PageId) -> Result<Self> {
        let mut index = Self { session, header_id };
        index.header()?;
        Ok(index)
    }

    pub fn header_id(&self) -> PageId {
        self.header_id
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn insert(&mut self, id: u64, rect: Rect) -> Result<()> {
        let mut header = self.header()?;
        let mut directory = self.directory(&header)?;

        let mut target = None;
        for (pos, (leaf_id, _)) in directory.leaves.iter().enumerate() {
            let leaf = self.leaf(*leaf_id)?;
            if leaf.items.len() < LEAF_CAPACITY {
                target = Some((pos, leaf));
                break;
            }
        }

        match target {
            Some((pos, mut leaf)) => {
                leaf.items.push((id, rect));
                let (leaf_id, bounds) = directory.leaves[pos];
                self.session.store(leaf_id, bincode::serialize(&leaf)?)?;
                directory.leaves[pos] = (leaf_id, bounds.union(&rect));
            }
            None => {
                let leaf = Leaf {
                    items: vec![(id, rect)],
                };
                let leaf_id = self.session.store(PageRef::New, bincode::serialize(&leaf)?)?;
                directory.leaves.push((leaf_id, rect));
            }
        }

        header.item_count += 1;
        self.write(&header, &directory)
    }

    /// Remove item `id`. Returns whether it was present.
    pub fn delete(&mut self, id: u64, rect: Rect) -> Result<bool> {
        let mut header = self.header()?;
        let mut directory = self.directory(&header)?;

        let mut found = None;
        for (pos, (leaf_id, bounds)) in directory.leaves.iter().enumerate() {
            if !bounds.intersects(&rect) {
                continue;
            }
            let leaf = self.leaf(*leaf_id)?;
            if let Some(item) = leaf.items.iter().position(|(item_id, _)| *item_id == id) {
                found = Some((pos, item, leaf));
                break;
            }
        }

        let Some((pos, item, mut leaf)) = found else {
            return Ok(false);
        };

        leaf.items.remove(item);
        let (leaf_id, _) = directory.leaves[pos];
        if leaf.items.is_empty() {
            self.session.delete(leaf_id)?;
            directory.leaves.remove(pos);
        } else {
            let bounds = leaf.items[1..]
                .iter()
                .fold(leaf.items[0].1, |acc, (_, r)| acc.union(r));
            self.session.store(leaf_id, bincode::serialize(&leaf)?)?;
            directory.leaves[pos] = (leaf_id, bounds);
        }

        header.item_count -= 1;
        self.write(&header, &directory)?;
        Ok(true)
    }

    /// Number of items intersecting `query`.
    pub fn count(&mut self, query: Rect) -> Result<usize> {
        let header = self.header()?;
        let directory = self.directory(&header)?;

        let mut count = 0;
        for (leaf_id, bounds) in &directory.leaves {
            if !bounds.intersects(&query) {
                continue;
            }
            let leaf = self.leaf(*leaf_id)?;
            count += leaf
                .items
                .iter()
                .filter(|(_, rect)| rect.intersects(&query))
                .count();
        }
        Ok(count)
    }

    /// Check that the header, directory and leaves agree with each other.
    pub fn is_valid(&mut self) -> Result<bool> {
        let header = self.header()?;
        let directory = self.directory(&header)?;

        let mut items = 0u64;
        for (leaf_id, bounds) in &directory.leaves {
            let leaf = self.leaf(*leaf_id)?;
            if leaf.items.is_empty() {
                return Ok(false);
            }
            if leaf.items.iter().any(|(_, rect)| !bounds.contains(rect)) {
                return Ok(false);
            }
            items += leaf.items.len() as u64;
        }
        Ok(items == header.item_count)
    }

    pub fn close(self) -> Result<B> {
        Ok(self.session.close()?)
    }

    fn header(&mut self) -> Result<Header> {
        let data = self.session.load(self.header_id)?;
        Ok(bincode::deserialize(&data)?)
    }

    fn directory(&mut self, header: &Header) -> Result<Directory> {
        let data = self.session.load(header.directory)?;
        Ok(bincode::deserialize(&data)?)
    }

    fn leaf(&mut self, leaf_id: PageId) -> Result<Leaf> {
        let data = self.session.load(leaf_id)?;
        let leaf: Leaf = bincode::deserialize(&data)?;
        if leaf.items.len() > LEAF_CAPACITY {
            bail!("leaf {} overflows", leaf_id);
        }
        Ok(leaf)
    }

    fn write(&mut self, header: &Header, directory: &Directory) -> Result<()> {
        self.session.store(header.directory, bincode::serialize(directory)?)?;
        self.session.store(self.header_id, bincode::serialize(header)?)?;
        Ok(())
    }
}
