//! # StatIndex — multi-indexed store of file metadata and fingerprints
//!
//! One record per known file, reachable four ways:
//!
//! - by `path` (primary key, unique)
//! - by `(device, inode)` (unique)
//! - by full content hash (non-unique)
//! - by 16-byte prefix tag (non-unique)
//!
//! A single mutex guards every table; each public method holds it for its
//! full duration, so the invariants (every record reachable through each of
//! its secondary keys, and every secondary entry backed by a primary
//! record) hold after every public mutation.
//!
//! The store persists as a gzip-compressed JSON snapshot with two arrays:
//! `files` (records, short field keys) and `collisions` (pairs of paths the
//! user has accepted as genuine duplicates). Only one orientation of each
//! collision pair is written; the in-memory set is symmetric.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::pattern::{DateKind, FileMeta};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Stat fields of a file before its fingerprints are computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub path: Utf8PathBuf,
    pub size: u64,
    /// Nanoseconds since the Unix epoch; 0 when the platform cannot report it.
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
    pub inode: u64,
    pub device: u64,
}

impl FileStat {
    /// Promote to a full record once both fingerprints are known.
    pub fn complete(self, file_hash: String, first_16b: String) -> FileInfo {
        FileInfo {
            path: self.path,
            size: self.size,
            modified: self.modified,
            accessed: self.accessed,
            created: self.created,
            inode: self.inode,
            device: self.device,
            file_hash,
            first_16b,
        }
    }
}

/// The canonical record for a known file. Serializes directly into the
/// snapshot's short-key form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "fp")]
    pub path: Utf8PathBuf,
    #[serde(rename = "sz")]
    pub size: u64,
    #[serde(rename = "mt")]
    pub modified: i64,
    #[serde(rename = "at")]
    pub accessed: i64,
    #[serde(rename = "ct")]
    pub created: i64,
    #[serde(rename = "in")]
    pub inode: u64,
    #[serde(rename = "dv")]
    pub device: u64,
    #[serde(rename = "fh")]
    pub file_hash: String,
    #[serde(rename = "16")]
    pub first_16b: String,
}

impl FileMeta for FileStat {
    fn path(&self) -> &Utf8Path {
        &self.path
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn timestamp(&self, kind: DateKind) -> i64 {
        match kind {
            DateKind::Modified => self.modified,
            DateKind::Accessed => self.accessed,
            DateKind::Created => self.created,
        }
    }
}

impl FileMeta for FileInfo {
    fn path(&self) -> &Utf8Path {
        &self.path
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn timestamp(&self, kind: DateKind) -> i64 {
        match kind {
            DateKind::Modified => self.modified,
            DateKind::Accessed => self.accessed,
            DateKind::Created => self.created,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    #[serde(default)]
    files: Vec<FileInfo>,
    #[serde(default)]
    collisions: Vec<(Utf8PathBuf, Utf8PathBuf)>,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    next_index: u64,
    records: HashMap<u64, FileInfo>,
    by_path: HashMap<Utf8PathBuf, u64>,
    by_dvin: HashMap<(u64, u64), u64>,
    by_hash: IndexMap<String, Vec<u64>>,
    by_f16b: IndexMap<String, Vec<u64>>,
    collisions: HashSet<(Utf8PathBuf, Utf8PathBuf)>,
    dirty: bool,
}

impl Tables {
    // Insert without checks; callers validate first.
    fn insert(&mut self, info: FileInfo) -> u64 {
        self.next_index += 1;
        let idx = self.next_index;
        self.by_path.insert(info.path.clone(), idx);
        self.by_dvin.insert((info.device, info.inode), idx);
        self.by_hash.entry(info.file_hash.clone()).or_default().push(idx);
        self.by_f16b.entry(info.first_16b.clone()).or_default().push(idx);
        self.records.insert(idx, info);
        idx
    }

    fn unlink_bags(&mut self, idx: u64, info: &FileInfo) {
        remove_from_bag(&mut self.by_hash, &info.file_hash, idx);
        remove_from_bag(&mut self.by_f16b, &info.first_16b, idx);
    }

    fn link_bags(&mut self, idx: u64, info: &FileInfo) {
        self.by_hash.entry(info.file_hash.clone()).or_default().push(idx);
        self.by_f16b.entry(info.first_16b.clone()).or_default().push(idx);
    }
}

fn remove_from_bag(bag: &mut IndexMap<String, Vec<u64>>, key: &str, idx: u64) {
    if let Some(entries) = bag.get_mut(key) {
        entries.retain(|&i| i != idx);
        if entries.is_empty() {
            bag.shift_remove(key);
        }
    }
}

// ---------------------------------------------------------------------------
// StatIndex
// ---------------------------------------------------------------------------

pub struct StatIndex {
    cache_path: Option<Utf8PathBuf>,
    state: Mutex<Option<Tables>>,
}

impl StatIndex {
    pub fn new(cache_path: Option<Utf8PathBuf>) -> Self {
        StatIndex {
            cache_path,
            state: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Tables>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Populate the tables from the configured snapshot, or start empty.
    /// Fails with [`IndexError::AlreadyLoaded`] on a second call. A corrupt
    /// snapshot is logged and replaced by an empty index rather than
    /// aborting the run.
    pub fn load(&self) -> Result<(), IndexError> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(IndexError::AlreadyLoaded);
        }

        let mut tables = Tables::default();
        if let Some(path) = &self.cache_path {
            match read_snapshot(path) {
                Ok(Some(snapshot)) => {
                    for info in snapshot.files {
                        tables.insert(info);
                    }
                    for (a, b) in snapshot.collisions {
                        tables.collisions.insert((b.clone(), a.clone()));
                        tables.collisions.insert((a, b));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Unreadable snapshot, starting with an empty index: {e}");
                }
            }
        }
        *guard = Some(tables);
        Ok(())
    }

    /// Write the snapshot atomically. A no-op when nothing changed since
    /// load, or when no cache path is configured.
    pub fn save(&self) -> Result<(), IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;
        if !tables.dirty {
            return Ok(());
        }
        let Some(path) = &self.cache_path else {
            tracing::debug!("No cache file configured, skipping index save");
            return Ok(());
        };

        let mut files: Vec<FileInfo> = tables.records.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let collisions: Vec<(Utf8PathBuf, Utf8PathBuf)> = tables
            .collisions
            .iter()
            .filter(|(a, b)| a < b)
            .cloned()
            .collect();

        write_snapshot(path, &Snapshot { files, collisions })?;
        tables.dirty = false;
        Ok(())
    }

    /// Insert a new record. Fails with [`IndexError::ItemExists`] when the
    /// path is already present. Returns the new record index.
    pub fn add_item(&self, info: FileInfo) -> Result<u64, IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;
        if tables.by_path.contains_key(&info.path) {
            return Err(IndexError::ItemExists(info.path));
        }
        tables.dirty = true;
        Ok(tables.insert(info))
    }

    /// Replace the record at `index` (or looked up by `info.path`) with
    /// `info`. The path must not change; all secondary indexes are
    /// repaired. Returns the record index.
    pub fn update_item(&self, info: FileInfo, index: Option<u64>) -> Result<u64, IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;

        let idx = match index {
            Some(idx) => {
                if !tables.records.contains_key(&idx) {
                    return Err(IndexError::ItemNotFound(format!("index {idx}")));
                }
                idx
            }
            None => *tables
                .by_path
                .get(&info.path)
                .ok_or_else(|| IndexError::ItemNotFound(format!("path {}", info.path)))?,
        };

        let old = tables.records[&idx].clone();
        if old.path != info.path {
            return Err(IndexError::InvalidItem(
                "cannot change path of existing item".to_string(),
            ));
        }
        let new_dvin = (info.device, info.inode);
        if matches!(tables.by_dvin.get(&new_dvin), Some(&other) if other != idx) {
            return Err(IndexError::InvalidItem(format!(
                "device/inode {new_dvin:?} belongs to another item"
            )));
        }

        tables.dirty = true;
        tables.unlink_bags(idx, &old);
        tables.by_dvin.remove(&(old.device, old.inode));
        tables.by_dvin.insert(new_dvin, idx);
        tables.link_bags(idx, &info);
        tables.records.insert(idx, info);
        Ok(idx)
    }

    /// Rewrite the primary path key of a record, repairing the path index.
    /// Used when a file was detected as moved or renamed. Fails with
    /// [`IndexError::ItemExists`] when the new path is already indexed.
    pub fn relocate_item(&self, index: u64, new_path: &Utf8Path) -> Result<(), IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;

        let old_path = tables
            .records
            .get(&index)
            .map(|info| info.path.clone())
            .ok_or_else(|| IndexError::ItemNotFound(format!("index {index}")))?;
        if old_path.as_path() == new_path {
            return Ok(());
        }
        if tables.by_path.contains_key(new_path) {
            return Err(IndexError::ItemExists(new_path.to_owned()));
        }

        tables.dirty = true;
        tables.by_path.remove(&old_path);
        tables.by_path.insert(new_path.to_owned(), index);
        if let Some(info) = tables.records.get_mut(&index) {
            info.path = new_path.to_owned();
        }
        Ok(())
    }

    pub fn pop_by_index(&self, index: u64) -> Result<FileInfo, IndexError> {
        self.pop(|tables| {
            tables
                .records
                .contains_key(&index)
                .then_some(index)
                .ok_or_else(|| IndexError::ItemNotFound(format!("index {index}")))
        })
    }

    pub fn pop_by_path(&self, path: &Utf8Path) -> Result<FileInfo, IndexError> {
        self.pop(|tables| {
            tables
                .by_path
                .get(path)
                .copied()
                .ok_or_else(|| IndexError::ItemNotFound(format!("path {path}")))
        })
    }

    pub fn pop_by_device_inode(&self, device: u64, inode: u64) -> Result<FileInfo, IndexError> {
        self.pop(|tables| {
            tables
                .by_dvin
                .get(&(device, inode))
                .copied()
                .ok_or_else(|| {
                    IndexError::ItemNotFound(format!("device/inode ({device}, {inode})"))
                })
        })
    }

    fn pop(
        &self,
        resolve: impl FnOnce(&Tables) -> Result<u64, IndexError>,
    ) -> Result<FileInfo, IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;
        let idx = resolve(tables)?;

        tables.dirty = true;
        let info = tables
            .records
            .remove(&idx)
            .ok_or_else(|| IndexError::ItemNotFound(format!("index {idx}")))?;
        tables.by_path.remove(&info.path);
        tables.by_dvin.remove(&(info.device, info.inode));
        tables.unlink_bags(idx, &info);
        Ok(info)
    }

    pub fn find_by_index(&self, index: u64) -> Result<Option<FileInfo>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables.records.get(&index).cloned())
    }

    pub fn find_by_path(&self, path: &Utf8Path) -> Result<Option<(u64, FileInfo)>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables
            .by_path
            .get(path)
            .map(|&idx| (idx, tables.records[&idx].clone())))
    }

    pub fn find_by_device_inode(
        &self,
        device: u64,
        inode: u64,
    ) -> Result<Option<(u64, FileInfo)>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables
            .by_dvin
            .get(&(device, inode))
            .map(|&idx| (idx, tables.records[&idx].clone())))
    }

    pub fn find_by_hash(&self, file_hash: &str) -> Result<Vec<FileInfo>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(collect_bag(&tables.records, tables.by_hash.get(file_hash)))
    }

    pub fn find_by_prefix(&self, first_16b: &str) -> Result<Vec<FileInfo>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(collect_bag(&tables.records, tables.by_f16b.get(first_16b)))
    }

    /// Every `(hash, record indexes)` group, in first-seen hash order.
    pub fn groups_by_hash(&self) -> Result<Vec<(String, Vec<u64>)>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables
            .by_hash
            .iter()
            .map(|(hash, idxs)| (hash.clone(), idxs.clone()))
            .collect())
    }

    pub fn paths(&self) -> Result<Vec<Utf8PathBuf>, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables.by_path.keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lock().as_ref().map(|t| t.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that the user accepted `(a, b)` as a genuine hash collision.
    pub fn accept_collision(&self, a: &Utf8Path, b: &Utf8Path) -> Result<(), IndexError> {
        let mut guard = self.lock();
        let tables = guard.as_mut().ok_or(IndexError::NotLoaded)?;
        tables.dirty = true;
        tables.collisions.insert((a.to_owned(), b.to_owned()));
        tables.collisions.insert((b.to_owned(), a.to_owned()));
        Ok(())
    }

    pub fn is_accepted_collision(&self, a: &Utf8Path, b: &Utf8Path) -> Result<bool, IndexError> {
        let guard = self.lock();
        let tables = guard.as_ref().ok_or(IndexError::NotLoaded)?;
        Ok(tables.collisions.contains(&(a.to_owned(), b.to_owned())))
    }
}

fn collect_bag(records: &HashMap<u64, FileInfo>, idxs: Option<&Vec<u64>>) -> Vec<FileInfo> {
    idxs.map(|idxs| {
        idxs.iter()
            .filter_map(|idx| records.get(idx).cloned())
            .collect()
    })
    .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Snapshot IO
// ---------------------------------------------------------------------------

fn read_snapshot(path: &Utf8Path) -> Result<Option<Snapshot>, IndexError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(IndexError::Snapshot {
                path: path.to_owned(),
                message: e.to_string(),
            })
        }
    };
    let decoder = GzDecoder::new(BufReader::new(file));
    let snapshot = serde_json::from_reader(decoder).map_err(|e| IndexError::Snapshot {
        path: path.to_owned(),
        message: e.to_string(),
    })?;
    Ok(Some(snapshot))
}

fn write_snapshot(path: &Utf8Path, snapshot: &Snapshot) -> Result<(), IndexError> {
    let io_err = |e: &dyn std::fmt::Display| IndexError::Snapshot {
        path: path.to_owned(),
        message: e.to_string(),
    };

    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(&e))?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
        serde_json::to_writer(&mut encoder, snapshot).map_err(|e| io_err(&e))?;
        let mut writer = encoder.finish().map_err(|e| io_err(&e))?;
        writer.flush().map_err(|e| io_err(&e))?;
    }
    temp.persist(path).map_err(|e| io_err(&e))?;
    Ok(())
}
