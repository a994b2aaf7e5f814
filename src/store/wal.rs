use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// One durable change to the document set. This is the log record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(super) enum Record<D> {
    Created { id: String, document: D },
    Updated { id: String, document: D },
    Deleted { id: String },
}

/// Bytes around the payload: length prefix and CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single record to [len][json][crc32] format.
fn encode_frame<D: Serialize>(record: &Record<D>) -> io::Result<Vec<u8>> {
    let payload = serde_json::to_vec(record)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
    let crc = crc32fast::hash(&payload);
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD as usize);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// What the log is written to.
pub(super) trait LogFile: Write {
    fn sync(&self) -> io::Result<()>;

    fn truncate(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Records recovered from disk and the length of the intact prefix.
pub(super) struct Replay<D> {
    pub records: Vec<Record<D>>,
    pub valid_len: u64,
}

/// Append-only write-ahead log of document records.
///
/// Format per entry: `[u32: len][json: Record][u32: crc32]`
/// - `len` is the byte length of the JSON payload (not including the CRC).
/// - A torn or corrupt tail is cut off when the log is opened, so new frames
///   always follow the last valid one.
/// - An append either lands whole and synced, or is rolled back.
pub(super) struct Wal<F = File> {
    file: F,
    path: PathBuf,
    /// End of the last complete, synced frame.
    len: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
    appends_since_compact: u64,
}

impl Wal<File> {
    /// Open (or create) the log at `path`, cutting it back to `valid_len`.
    pub fn open(path: &Path, valid_len: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            warn!(
                "discarding {} bytes of torn log tail in {}",
                on_disk - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len: on_disk.min(valid_len),
            poisoned: false,
            appends_since_compact: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted records to a temp file and fsync.
    fn write_compact_file<D: Serialize>(path: &Path, records: &[Record<D>]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writer.write_all(&encode_frame(record)?)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the log and reopen.
    fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = file.metadata()?.len();
        self.file = file;
        self.poisoned = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Replace the log with a minimal set of records that recreates the current state.
    pub fn compact<D: Serialize>(&mut self, records: &[Record<D>]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    /// Replay the log from disk, returning all valid records.
    /// Replay stops at the first truncated or corrupt entry.
    pub fn replay<D: DeserializeOwned>(path: &Path) -> io::Result<Replay<D>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay {
                    records: Vec::new(),
                    valid_len: 0,
                });
            }
            Err(e) => return Err(e),
        };
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;

        while size - offset >= FRAME_OVERHEAD {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let len = u64::from(u32::from_le_bytes(len_buf));
            if len > size - offset - FRAME_OVERHEAD {
                break; // truncated, or a corrupt length prefix
            }

            let mut payload = vec![0u8; len as usize];
            reader.read_exact(&mut payload)?;
            let mut crc_buf = [0u8; 4];
            reader.read_exact(&mut crc_buf)?;
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }

            match serde_json::from_slice::<Record<D>>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            offset += FRAME_OVERHEAD + len;
        }

        Ok(Replay {
            records,
            valid_len: offset,
        })
    }
}

impl<F: LogFile> Wal<F> {
    /// Append one record and sync it. On failure the log is cut back to its
    /// previous length so no partial frame remains.
    pub fn append<D: Serialize>(&mut self, record: &Record<D>) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("log unusable after a failed rollback"));
        }
        let frame = encode_frame(record)?;
        match self.file.write_all(&frame).and_then(|()| self.file.sync()) {
            Ok(()) => {
                self.len += frame.len() as u64;
                self.appends_since_compact += 1;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        if let Err(e) = self.file.truncate(self.len).and_then(|()| self.file.sync()) {
            error!("cannot cut log back to {} bytes: {e}", self.len);
            self.poisoned = true;
        }
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}
