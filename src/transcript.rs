//! Chat transcript: the durable, append-only record of every chat event.
//!
//! The broadcast engine writes a record here *before* delivering anything
//! to peers. A failed append aborts the triggering operation.

use crate::error::TranscriptError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ANSI C style, e.g. `Mon Jan  2 15:04:05 2006`.
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Used in the transcript file name; no colons so it is path-safe everywhere.
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Format a timestamp the way transcript records carry it.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Build the per-run transcript file path inside `dir`.
pub fn transcript_path(dir: &Path, started: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "client-log-{}.log",
        started.format(FILE_TIMESTAMP_FORMAT)
    ))
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptRecord<'a> {
    Joined { name: &'a str, at: DateTime<Utc> },
    Message { name: &'a str, text: &'a str },
    Left { name: &'a str, at: DateTime<Utc> },
}

impl<'a> TranscriptRecord<'a> {
    pub fn joined(name: &'a str) -> Self {
        Self::Joined { name, at: Utc::now() }
    }

    pub fn message(name: &'a str, text: &'a str) -> Self {
        Self::Message { name, text }
    }

    pub fn left(name: &'a str) -> Self {
        Self::Left { name, at: Utc::now() }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Joined { name, .. } | Self::Message { name, .. } | Self::Left { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "join",
            Self::Message { .. } => "message",
            Self::Left { .. } => "exit",
        }
    }
}

impl fmt::Display for TranscriptRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined { name, at } => write!(f, "user: {} joined at: {}", name, timestamp(*at)),
            Self::Message { name, text } => write!(f, "user: {} sent message: {}", name, text),
            Self::Left { name, at } => write!(f, "user: {} has left at: {}", name, timestamp(*at)),
        }
    }
}

/// Where transcript lines end up.
///
/// Implementations must write each call's bytes as one unit: concurrent
/// appends from different sessions may not interleave.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, line: &[u8]) -> io::Result<()>;
}

/// Append-only transcript file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create (or truncate) the transcript file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TranscriptSink for FileSink {
    fn append(&self, line: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(line)?;
        file.flush()
    }
}

/// In-memory transcript, for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    buf: Mutex<Vec<u8>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail (simulates a full or broken disk).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Recorded lines, without trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl TranscriptSink for MemorySink {
    fn append(&self, line: &[u8]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("transcript sink unavailable"));
        }
        self.buf.lock().extend_from_slice(line);
        Ok(())
    }
}

/// Shared handle to the transcript sink.
#[derive(Clone)]
pub struct Transcript {
    sink: Arc<dyn TranscriptSink>,
}

impl Transcript {
    pub fn new(sink: Arc<dyn TranscriptSink>) -> Self {
        Self { sink }
    }

    /// Append one record, terminated by a newline.
    pub fn append(&self, record: &TranscriptRecord<'_>) -> Result<(), TranscriptError> {
        let line = format!("{record}\n");
        if let Err(e) = self.sink.append(line.as_bytes()) {
            crate::metrics::record_transcript_failure(record.kind());
            tracing::error!(user = record.name(), kind = record.kind(), error = %e, "Transcript append failed");
            return Err(TranscriptError::Io(e));
        }
        Ok(())
    }
}
