// src/keys/store.rs

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use super::record::{sort_newest_first, Record};
use crate::error::StoreError;

/// How a new record reaches the key file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Read the whole table, add the row, write a fresh copy over the old one.
    #[default]
    Rewrite,
    /// Append one line to the end of the file.
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Rewrite => f.write_str("rewrite"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rewrite" => Ok(WriteMode::Rewrite),
            "append" => Ok(WriteMode::Append),
            other => Err(format!("unknown write mode `{}` (expected rewrite|append)", other)),
        }
    }
}

/// Deduplicated record store backed by an `access_key,timestamp` CSV file.
///
/// `seen` mirrors the keys on disk so duplicate checks never touch the file.
/// It is only updated after the file write has gone through, so a failed
/// write leaves both sides as they were. There is no locking: another
/// process rewriting the same file at the same time can lose rows.
pub struct KeyStore {
    path: PathBuf,
    mode: WriteMode,
    seen: HashSet<String>,
}

impl KeyStore {
    /// Open the store at `path`, seeding the seen-set from whatever is already on disk.
    pub fn open(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        let mut store = Self {
            path: path.into(),
            mode,
            seen: HashSet::new(),
        };
        store.seen = store.load();
        info!(
            path = %store.path.display(),
            keys = store.seen.len(),
            %mode,
            "key store opened"
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// All access keys currently in the file. An unreadable or malformed file
    /// is logged and treated as empty.
    pub fn load(&self) -> HashSet<String> {
        match self.read_records() {
            Ok(records) => records.into_iter().map(|r| r.access_key).collect(),
            Err(e) => {
                error!("Error loading existing keys: {}", e);
                HashSet::new()
            }
        }
    }

    /// Every row of the file in file order. A missing file is an empty table.
    pub fn read_records(&self) -> Result<Vec<Record>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<Record>, _>>()
            .map_err(|e| StoreError::csv(&self.path, e))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Number of keys collected this session (size of the seen-set).
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Record `key` with the current local time.
    pub fn append(&mut self, key: &str) -> Result<Record, StoreError> {
        self.append_at(key, Local::now().naive_local())
    }

    /// Record `key` with an explicit timestamp.
    pub fn append_at(&mut self, key: &str, at: NaiveDateTime) -> Result<Record, StoreError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        if self.seen.contains(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let record = Record::new(key, at);
        match self.mode {
            WriteMode::Rewrite => self.rewrite_with(&record)?,
            WriteMode::Append => self.append_line(&record)?,
        }

        self.seen.insert(record.access_key.clone());
        info!(key = %record.access_key, "new access key saved");
        Ok(record)
    }

    /// Delete the file and forget every key. Irreversible.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "all data cleared"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&self.path, e)),
        }
        self.seen.clear();
        Ok(())
    }

    /// Rows in the file right now, duplicates included.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_records()?.len())
    }

    /// Distinct keys in the file right now.
    pub fn unique_key_count(&self) -> Result<usize, StoreError> {
        let records = self.read_records()?;
        let unique: HashSet<&str> = records.iter().map(|r| r.access_key.as_str()).collect();
        Ok(unique.len())
    }

    /// All rows, newest timestamp first.
    pub fn records_newest_first(&self) -> Result<Vec<Record>, StoreError> {
        let mut records = self.read_records()?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// The last `limit` rows of the file, newest timestamp first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let mut records = self.read_records()?;
        let tail = records.len().saturating_sub(limit);
        let mut recent = records.split_off(tail);
        sort_newest_first(&mut recent);
        Ok(recent)
    }

    /// Copy the key file to `dest`, returning the number of bytes copied.
    pub fn export(&self, dest: impl AsRef<Path>) -> Result<u64, StoreError> {
        let dest = dest.as_ref();
        let bytes = fs::copy(&self.path, dest).map_err(|e| StoreError::io(&self.path, e))?;
        info!(from = %self.path.display(), to = %dest.display(), bytes, "key file exported");
        Ok(bytes)
    }

    fn rewrite_with(&self, record: &Record) -> Result<(), StoreError> {
        // 1) Load the current table; a malformed file aborts before anything is written
        let mut records = self.read_records()?;
        records.push(record.clone());

        // 2) Write the whole table to a temp file next to the target
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            for r in &records {
                writer
                    .serialize(r)
                    .map_err(|e| StoreError::csv(&self.path, e))?;
            }
            writer.flush().map_err(|e| StoreError::io(&self.path, e))?;
        }
        if let Some(perms) = target_permissions(&self.path) {
            tmp.as_file()
                .set_permissions(perms)
                .map_err(|e| StoreError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;

        // 3) Swap it in over the old file
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        debug!(rows = records.len(), path = %self.path.display(), "key file rewritten");
        Ok(())
    }

    fn append_line(&self, record: &Record) -> Result<(), StoreError> {
        // 1) Refuse a malformed file, same as a rewrite would
        self.read_records()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        let start = file
            .metadata()
            .map_err(|e| StoreError::io(&self.path, e))?
            .len();

        // 2) Build the row, terminating a last line that lacks its newline
        let mut bytes = Vec::new();
        let unterminated = start > 0
            && !ends_with_newline(&mut file).map_err(|e| StoreError::io(&self.path, e))?;
        if unterminated {
            bytes.push(b'\n');
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(start == 0)
            .from_writer(bytes);
        writer
            .serialize(record)
            .map_err(|e| StoreError::csv(&self.path, e))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io(&self.path, e.into_error()))?;

        // 3) A short write is rolled back so the file never holds half a row
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_data()) {
            let _ = file.set_len(start);
            return Err(StoreError::io(&self.path, e));
        }
        debug!(path = %self.path.display(), "key appended");
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Permissions for the replacement file: the current file's if there is one.
fn target_permissions(path: &Path) -> Option<fs::Permissions> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}
