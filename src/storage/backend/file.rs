//! Append-only page file backend.
//!
//! Every store or delete appends one record to the file. Each record is a
//! little-endian `u32` length followed by a bincode-encoded [`PageRecord`].
//! The in-memory index (page id to record location) is rebuilt by replaying
//! the file in `create`, and the latest record for an id wins.

use super::StorageBackend;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageRef};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the length prefix in front of every record.
const FRAME_HEADER_LEN: u64 = 4;

/// File backend configuration.
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    /// Path of the page file.
    pub path: PathBuf,
    /// Whether to sync the file to disk after every appended record.
    pub sync_on_write: bool,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        FileBackendConfig {
            path: PathBuf::from("pagestore.db"),
            sync_on_write: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum PageRecord {
    Store { page_id: PageId, data: Vec<u8> },
    Delete { page_id: PageId },
    /// Lowest id the allocator may hand out. Written by compaction so ids of
    /// dropped pages stay retired.
    Watermark { next_page_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordLocation {
    offset: u64,
    len: u32,
}

impl RecordLocation {
    fn end(&self) -> u64 {
        self.offset + FRAME_HEADER_LEN + self.len as u64
    }
}

#[derive(Debug, Default)]
struct Replay {
    index: HashMap<PageId, RecordLocation>,
    next_page_id: u64,
    valid_len: u64,
}

impl Replay {
    fn apply(&mut self, record: PageRecord, location: RecordLocation) {
        match record {
            PageRecord::Store { page_id, .. } => {
                self.next_page_id = self.next_page_id.max(page_id.0.saturating_add(1));
                self.index.insert(page_id, location);
            }
            PageRecord::Delete { page_id } => {
                self.next_page_id = self.next_page_id.max(page_id.0.saturating_add(1));
                self.index.remove(&page_id);
            }
            PageRecord::Watermark { next_page_id } => {
                self.next_page_id = self.next_page_id.max(next_page_id);
            }
        }
        self.valid_len = location.end();
    }
}

pub struct FileBackend {
    config: FileBackendConfig,
    file: Option<File>,
    index: HashMap<PageId, RecordLocation>,
    next_page_id: u64,
    file_len: u64,
}

impl FileBackend {
    pub fn new(config: FileBackendConfig) -> Self {
        Self {
            config,
            file: None,
            index: HashMap::new(),
            next_page_id: 0,
            file_len: 0,
        }
    }

    pub fn at(path: impl AsRef<Path>) -> Self {
        Self::new(FileBackendConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Current size of the page file in bytes.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Ids of every live page, in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.index.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Rewrite the file so it holds only the latest version of each live page.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&mut self) -> StorageResult<u64> {
        if self.file.is_none() {
            return Err(StorageError::unavailable("page file is not open"));
        }

        let mut pages = Vec::with_capacity(self.index.len());
        for page_id in self.page_ids() {
            pages.push((page_id, self.load(page_id)?));
        }

        let tmp_path = self.config.path.with_extension("compact");
        let mut index = HashMap::with_capacity(pages.len());
        let mut offset = 0u64;
        {
            let tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(tmp);

            let watermark = PageRecord::Watermark {
                next_page_id: self.next_page_id,
            };
            offset = write_frame(&mut writer, &watermark, offset)?.end();

            for (page_id, data) in pages {
                let record = PageRecord::Store {
                    page_id,
                    data: data.to_vec(),
                };
                let location = write_frame(&mut writer, &record, offset)?;
                index.insert(page_id, location);
                offset = location.end();
            }

            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        // Close the old handle before the rename replaces the file under it.
        self.file = None;
        if let Err(e) = fs::rename(&tmp_path, &self.config.path) {
            log::error!("Failed to replace {:?} after compaction: {}", self.config.path, e);
            self.file = Some(open_page_file(&self.config.path)?);
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                log::warn!("Failed to remove {:?}: {}", tmp_path, remove_err);
            }
            return Err(e.into());
        }
        self.file = Some(open_page_file(&self.config.path)?);

        let reclaimed = self.file_len.saturating_sub(offset);
        log::debug!(
            "Compacted {:?}: {} live pages, {} bytes reclaimed",
            self.config.path,
            index.len(),
            reclaimed
        );
        self.index = index;
        self.file_len = offset;

        Ok(reclaimed)
    }

    fn append(&mut self, record: &PageRecord) -> StorageResult<RecordLocation> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::unavailable("page file is not open"))?;

        file.seek(SeekFrom::Start(self.file_len))?;
        let location = write_frame(file, record, self.file_len)?;
        if self.config.sync_on_write {
            file.sync_data()?;
        }
        self.file_len = location.end();

        Ok(location)
    }

    fn read(&mut self, location: RecordLocation) -> StorageResult<PageRecord> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::unavailable("page file is not open"))?;

        let mut body = vec![0u8; location.len as usize];
        file.seek(SeekFrom::Start(location.offset + FRAME_HEADER_LEN))?;
        file.read_exact(&mut body)?;

        decode_record(&body, location.offset)
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.file.is_none() {
            return Err(StorageError::unavailable("page file is not open"));
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn create(&mut self) -> StorageResult<()> {
        if self.file.is_some() {
            return Err(StorageError::unavailable("page file is already open"));
        }

        let file = open_page_file(&self.config.path)?;
        let file_len = file.metadata()?.len();
        let replay = replay(&file, file_len)?;

        if replay.valid_len < file_len {
            log::warn!(
                "Truncating torn record at end of {:?} ({} bytes dropped)",
                self.config.path,
                file_len - replay.valid_len
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        log::info!(
            "Opened page file {:?}: {} pages, next id {}",
            self.config.path,
            replay.index.len(),
            replay.next_page_id
        );

        self.index = replay.index;
        self.next_page_id = replay.next_page_id;
        self.file_len = replay.valid_len;
        self.file = Some(file);
        Ok(())
    }

    fn destroy(&mut self) -> StorageResult<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| StorageError::unavailable("page file is not open"))?;
        file.sync_all()?;
        self.index.clear();
        Ok(())
    }

    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        self.check_open()?;
        let location = *self
            .index
            .get(&page_id)
            .ok_or(StorageError::InvalidPage(page_id))?;

        match self.read(location)? {
            PageRecord::Store {
                page_id: stored,
                data,
            } if stored == page_id => Ok(Bytes::from(data)),
            other => Err(StorageError::Serialization(format!(
                "record at offset {} does not hold {}: {:?}",
                location.offset, page_id, other
            ))),
        }
    }

    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId> {
        self.check_open()?;
        let page_id = match page {
            PageRef::New => PageId(self.next_page_id),
            PageRef::Existing(page_id) => {
                if !self.index.contains_key(&page_id) {
                    return Err(StorageError::InvalidPage(page_id));
                }
                page_id
            }
        };
        let next_page_id = match page {
            PageRef::New => self
                .next_page_id
                .checked_add(1)
                .ok_or(StorageError::AllocationExhausted)?,
            PageRef::Existing(_) => self.next_page_id,
        };

        let record = PageRecord::Store {
            page_id,
            data: data.to_vec(),
        };
        let location = self.append(&record)?;
        self.index.insert(page_id, location);
        self.next_page_id = next_page_id;

        Ok(page_id)
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        self.check_open()?;
        if !self.index.contains_key(&page_id) {
            return Err(StorageError::InvalidPage(page_id));
        }

        self.append(&PageRecord::Delete { page_id })?;
        self.index.remove(&page_id);
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::unavailable("page file is not open"))?;
        file.set_len(0)?;
        file.sync_all()?;

        self.index.clear();
        self.next_page_id = 0;
        self.file_len = 0;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.index.len()
    }
}

fn open_page_file(path: &Path) -> StorageResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

fn write_frame<W: Write>(
    writer: &mut W,
    record: &PageRecord,
    offset: u64,
) -> StorageResult<RecordLocation> {
    let body = bincode::serialize(record)?;
    let len = u32::try_from(body.len()).map_err(|_| {
        StorageError::Serialization(format!("record of {} bytes is too large", body.len()))
    })?;

    // One write per frame keeps a crash from interleaving header and body.
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN as usize + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame)?;

    Ok(RecordLocation { offset, len })
}

/// A record that does not decode means the file cannot be trusted.
fn decode_record(body: &[u8], offset: u64) -> StorageResult<PageRecord> {
    bincode::deserialize(body).map_err(|e| {
        StorageError::unavailable(format!("corrupt record at offset {}: {}", offset, e))
    })
}

fn replay(file: &File, file_len: u64) -> StorageResult<Replay> {
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;

    let mut replay = Replay::default();
    let mut offset = 0u64;

    while offset < file_len {
        if file_len - offset < FRAME_HEADER_LEN {
            break;
        }
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);

        if file_len - offset - FRAME_HEADER_LEN < len as u64 {
            break;
        }
        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body)?;

        let record = decode_record(&body, offset)?;
        let location = RecordLocation { offset, len };
        replay.apply(record, location);
        offset = location.end();
    }

    Ok(replay)
}
