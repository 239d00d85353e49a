use crate::{
    data_file_name, decode_header, decode_record, Event, TraceError, TraceInfo, HEADER_LEN,
    MAX_RECORD_LEN,
};
use rkyv::util::AlignedVec;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Read side of a trace directory.
pub struct TraceReader {
    dir: PathBuf,
    info: TraceInfo,
}

impl TraceReader {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TraceError> {
        let dir = dir.as_ref().to_path_buf();
        let info = TraceInfo::load(&dir)?;
        Ok(Self { dir, info })
    }

    pub fn info(&self) -> &TraceInfo {
        &self.info
    }

    pub fn task_ids(&self) -> Vec<i32> {
        let mut tids: Vec<i32> = self.info.tasks.iter().map(|task| task.tid).collect();
        tids.sort_unstable();
        tids.dedup();
        tids
    }

    /// Opens a fresh stream over the records of `tid`, starting at the first record.
    pub fn stream(&self, tid: i32) -> Result<TaskStream<BufReader<File>>, TraceError> {
        let path = self.dir.join(data_file_name(tid));
        let file = File::open(&path).map_err(|e| TraceError::file(&path, e))?;
        let stream = TaskStream::new(BufReader::new(file), path)?;
        if stream.tid() != tid {
            return Err(TraceError::malformed(
                stream.path,
                format!("header tid {} does not match task {}", stream.tid, tid),
            ));
        }
        Ok(stream)
    }
}

/// Lazily decodes the records of one thread. Fused after the first error.
pub struct TaskStream<R: Read> {
    reader: R,
    path: PathBuf,
    pid: i32,
    tid: i32,
    last_timestamp: u64,
    position: u64,
    finished: bool,
    buf: AlignedVec<16>,
}

impl<R: Read> TaskStream<R> {
    pub fn new(mut reader: R, path: impl Into<PathBuf>) -> Result<Self, TraceError> {
        let path = path.into();
        let mut header = [0u8; HEADER_LEN];
        match read_full(&mut reader, &mut header) {
            Ok(HEADER_LEN) => {}
            Ok(_) => return Err(TraceError::malformed(path, "truncated header")),
            Err(e) => return Err(TraceError::file(path, e)),
        }
        let header = decode_header(&header).map_err(|reason| TraceError::malformed(&path, reason))?;

        Ok(Self {
            reader,
            path,
            pid: header.pid,
            tid: header.tid,
            last_timestamp: 0,
            position: 0,
            finished: false,
            buf: AlignedVec::new(),
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn tid(&self) -> i32 {
        self.tid
    }

    /// Number of records decoded so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn malformed(&self, reason: impl Into<String>) -> TraceError {
        TraceError::malformed(&self.path, reason)
    }

    fn read_record(&mut self) -> Result<Option<Event>, TraceError> {
        let mut len = [0u8; 4];
        match read_full(&mut self.reader, &mut len) {
            Ok(0) => return Ok(None),
            Ok(4) => {}
            Ok(_) => {
                return Err(self.malformed(format!(
                    "truncated length of record {}",
                    self.position
                )))
            }
            Err(e) => return Err(TraceError::file(&self.path, e)),
        }

        let len = u32::from_le_bytes(len) as usize;
        if len == 0 || len > MAX_RECORD_LEN {
            return Err(self.malformed(format!(
                "invalid length {} of record {}",
                len, self.position
            )));
        }

        self.buf.clear();
        self.buf.resize(len, 0);
        if let Err(e) = self.reader.read_exact(&mut self.buf) {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => {
                    self.malformed(format!("truncated record {}", self.position))
                }
                _ => TraceError::file(&self.path, e),
            });
        }

        let event = decode_record(&self.buf, self.tid).map_err(|e| {
            self.malformed(format!("cannot decode record {}: {}", self.position, e))
        })?;
        if event.timestamp < self.last_timestamp {
            return Err(self.malformed(format!(
                "timestamp of record {} goes backwards ({} < {})",
                self.position, event.timestamp, self.last_timestamp
            )));
        }

        self.last_timestamp = event.timestamp;
        self.position += 1;
        Ok(Some(event))
    }
}

impl<R: Read> Iterator for TaskStream<R> {
    type Item = Result<Event, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_record() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Like `read_exact`, but reports how much was read before end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
