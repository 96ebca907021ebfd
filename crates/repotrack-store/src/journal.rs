use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::{CatalogState, Mutation};

/// One framed journal record.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JournalRecord {
    Mutation(Mutation),
    /// Full state written by compaction. Replay restarts from here.
    Snapshot(CatalogState),
}

/// Flush strategy for journal appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every record. A mutation is acknowledged only once durable.
    #[default]
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    OsDefault,
}

/// Where the journal lives and how hard it syncs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub path: PathBuf,
    pub sync_mode: SyncMode,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("repotrack.journal"),
            sync_mode: SyncMode::default(),
        }
    }
}

const HEADER_SIZE: usize = 8;

/// Append-only, crash-recoverable log of catalog mutations.
///
/// A torn record at the tail (a crash mid-append) is discarded when the
/// journal is opened. A damaged record followed by intact ones is
/// [`StoreError::CorruptJournal`]: later mutations depend on earlier ones,
/// so the history cannot be replayed around a hole.
///
/// A failed append is cut back to the last acknowledged offset. If that
/// truncation fails too, the writer is dropped and every later append is
/// refused with [`StoreError::JournalPoisoned`].
pub struct Journal {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    offset: u64,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal and return it along with every
    /// recovered record.
    pub fn open(config: &JournalConfig) -> StoreResult<(Self, Vec<JournalRecord>)> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&config.path)?;
        let file_len = file.metadata()?.len();

        let (records, valid_len) = scan(&config.path, file_len)?;
        if valid_len < file_len {
            warn!(
                path = %config.path.display(),
                valid_len,
                file_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(
            path = %config.path.display(),
            records = records.len(),
            "journal opened"
        );
        Ok((
            Self {
                path: config.path.clone(),
                writer: Some(BufWriter::new(file)),
                offset: valid_len,
                sync_mode: config.sync_mode,
            },
            records,
        ))
    }

    /// Append a record. Returns the byte offset it was written at.
    pub fn append(&mut self, record: &JournalRecord) -> StoreResult<u64> {
        let payload = encode(record)?;
        let entry_offset = self.offset;
        let writer = self.writer.as_mut().ok_or(StoreError::JournalPoisoned)?;
        if let Err(e) = write_durable(writer, &payload, self.sync_mode) {
            self.rollback();
            return Err(e);
        }
        self.offset += (HEADER_SIZE + payload.len()) as u64;
        Ok(entry_offset)
    }

    /// Discard anything written past the last acknowledged record.
    fn rollback(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        // `into_parts` hands back the file without flushing the buffer.
        let (file, _unflushed) = writer.into_parts();
        let truncated = file.set_len(self.offset).and_then(|()| match self.sync_mode {
            SyncMode::EveryWrite => file.sync_all(),
            SyncMode::OsDefault => Ok(()),
        });
        match truncated {
            Ok(()) => {
                warn!(path = %self.path.display(), offset = self.offset, "journal append rolled back");
                self.writer = Some(BufWriter::new(file));
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    offset = self.offset,
                    error = %e,
                    "journal rollback failed; refusing further appends"
                );
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.writer.is_none()
    }

    /// Replace the whole journal with a single snapshot of `state`.
    ///
    /// The snapshot is written to a temporary file next to the journal and
    /// renamed over it, so a crash leaves either the old or the new file.
    pub fn compact(&mut self, state: &CatalogState) -> StoreResult<()> {
        let payload = encode(&JournalRecord::Snapshot(state.clone()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            write_frame(&mut w, &payload)?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.error))?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let before = self.offset;
        self.offset = file.metadata()?.len();
        self.writer = Some(BufWriter::new(file));

        info!(
            path = %self.path.display(),
            before,
            after = self.offset,
            repositories = state.len(),
            "journal compacted"
        );
        Ok(())
    }

    /// Current size of the journal in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fold recovered records into a state.
///
/// A record that no longer applies means the history is inconsistent.
pub fn replay(records: &[JournalRecord]) -> StoreResult<CatalogState> {
    let mut state = CatalogState::new();
    for (index, record) in records.iter().enumerate() {
        match record {
            JournalRecord::Snapshot(snapshot) => state = snapshot.clone(),
            JournalRecord::Mutation(mutation) => {
                state.apply(mutation).map_err(|e| StoreError::CorruptJournal {
                    offset: index as u64,
                    reason: format!("record {index} ({}) does not apply: {e}", mutation.label()),
                })?;
            }
        }
    }
    Ok(state)
}

fn encode(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_durable(
    writer: &mut BufWriter<File>,
    payload: &[u8],
    sync_mode: SyncMode,
) -> StoreResult<()> {
    write_frame(writer, payload)?;
    writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> StoreResult<()> {
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization(format!("record of {} bytes", payload.len())))?;
    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Read every intact record. Returns the records and the length of the
/// valid prefix of the file.
fn scan(path: &Path, file_len: u64) -> StoreResult<(Vec<JournalRecord>, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let end = offset + HEADER_SIZE as u64 + length;

        if length == 0 || end > file_len {
            // Partially written frame.
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;

        if crc32fast::hash(&payload) != expected_crc {
            if end == file_len {
                break;
            }
            return Err(StoreError::CorruptJournal {
                offset,
                reason: "checksum mismatch".into(),
            });
        }

        let record = bincode::deserialize::<JournalRecord>(&payload).map_err(|e| {
            StoreError::CorruptJournal {
                offset,
                reason: e.to_string(),
            }
        })?;
        records.push(record);
        offset = end;
    }

    Ok((records, offset))
}
