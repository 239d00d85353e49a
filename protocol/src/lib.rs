//! Record format of an fntrace trace directory.
//!
//! A trace directory holds an `info` file (TOML) describing the recorded
//! command and its tasks, plus one `<tid>.dat` file per recorded thread.
//! Every data file starts with a fixed header followed by length-prefixed,
//! rkyv-archived [`Record`]s in timestamp order.

use rkyv::api::high::to_bytes_in;
use rkyv::with::InlineAsBox;
use rkyv::{Archive, Serialize};

mod error;
mod info;
mod reader;
mod writer;

pub use error::TraceError;
pub use info::{TaskInfo, TraceInfo};
pub use reader::{TaskStream, TraceReader};
pub use writer::TaskWriter;

pub const VERSION: u32 = 1;

pub const DATA_MAGIC: [u8; 8] = *b"FNTRACE\0";

/// magic + version + pid + tid
pub const HEADER_LEN: usize = 20;

/// Upper bound for a single archived record.
pub const MAX_RECORD_LEN: usize = 1 << 20;

/// Environment variable naming the directory an instrumented program writes to.
pub const TRACE_DIR_ENV: &str = "FNTRACE_DIR";

pub const INFO_FILE: &str = "info";

pub const DATA_EXTENSION: &str = "dat";

pub fn data_file_name(tid: i32) -> String {
    format!("{}.{}", tid, DATA_EXTENSION)
}

#[derive(Archive, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind<'a> {
    Entry {
        #[rkyv(with = InlineAsBox)]
        name: &'a str,
    },
    Exit {
        #[rkyv(with = InlineAsBox)]
        name: &'a str,
    },
    Meta {
        #[rkyv(with = InlineAsBox)]
        field: &'a str,
        #[rkyv(with = InlineAsBox)]
        value: &'a str,
    },
}

#[derive(Archive, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub timestamp: u64,
    pub kind: RecordKind<'a>,
}

/// A decoded record, owned and tagged with the thread it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub tid: i32,
    pub timestamp: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Entry { function: String },
    Exit { function: String },
    Meta { field: String, value: String },
}

impl Event {
    pub fn entry(tid: i32, timestamp: u64, function: impl Into<String>) -> Self {
        Event {
            tid,
            timestamp,
            kind: EventKind::Entry {
                function: function.into(),
            },
        }
    }

    pub fn exit(tid: i32, timestamp: u64, function: impl Into<String>) -> Self {
        Event {
            tid,
            timestamp,
            kind: EventKind::Exit {
                function: function.into(),
            },
        }
    }

    pub fn meta(
        tid: i32,
        timestamp: u64,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Event {
            tid,
            timestamp,
            kind: EventKind::Meta {
                field: field.into(),
                value: value.into(),
            },
        }
    }

    pub fn as_record(&self) -> Record<'_> {
        let kind = match &self.kind {
            EventKind::Entry { function } => RecordKind::Entry { name: function },
            EventKind::Exit { function } => RecordKind::Exit { name: function },
            EventKind::Meta { field, value } => RecordKind::Meta { field, value },
        };
        Record {
            timestamp: self.timestamp,
            kind,
        }
    }
}

pub fn encode_record(record: &Record<'_>) -> Result<Vec<u8>, rkyv::rancor::Error> {
    to_bytes_in::<_, rkyv::rancor::Error>(record, Vec::new())
}

/// `bytes` must be aligned for the archived record, see [`rkyv::util::AlignedVec`].
pub fn decode_record(bytes: &[u8], tid: i32) -> Result<Event, rkyv::rancor::Error> {
    let archived = rkyv::access::<ArchivedRecord, rkyv::rancor::Error>(bytes)?;
    let kind = match &archived.kind {
        ArchivedRecordKind::Entry { name } => EventKind::Entry {
            function: name.as_ref().to_string(),
        },
        ArchivedRecordKind::Exit { name } => EventKind::Exit {
            function: name.as_ref().to_string(),
        },
        ArchivedRecordKind::Meta { field, value } => EventKind::Meta {
            field: field.as_ref().to_string(),
            value: value.as_ref().to_string(),
        },
    };
    Ok(Event {
        tid,
        timestamp: archived.timestamp.to_native(),
        kind,
    })
}

pub(crate) fn encode_header(pid: i32, tid: i32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..8].copy_from_slice(&DATA_MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    header[12..16].copy_from_slice(&pid.to_le_bytes());
    header[16..20].copy_from_slice(&tid.to_le_bytes());
    header
}

pub(crate) struct Header {
    pub pid: i32,
    pub tid: i32,
}

pub(crate) fn decode_header(header: &[u8; HEADER_LEN]) -> Result<Header, String> {
    if header[..8] != DATA_MAGIC {
        return Err("bad magic".to_string());
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&header[8..12]);
    let version = u32::from_le_bytes(word);
    if version != VERSION {
        return Err(format!("unsupported data version {}", version));
    }
    word.copy_from_slice(&header[12..16]);
    let pid = i32::from_le_bytes(word);
    word.copy_from_slice(&header[16..20]);
    let tid = i32::from_le_bytes(word);
    Ok(Header { pid, tid })
}
