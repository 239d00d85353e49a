use crate::{data_file_name, encode_header, encode_record, Record, RecordKind, TraceError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Appends the records of one thread to its data file.
///
/// Each frame reaches the inner writer as a single `write_all`, so a
/// flushed file always ends on a frame boundary.
pub struct TaskWriter<W: Write> {
    writer: W,
    frame: Vec<u8>,
    records: u64,
}

impl TaskWriter<BufWriter<File>> {
    /// Creates `<tid>.dat` in `dir`; the header is on disk when this returns.
    pub fn create(dir: &Path, pid: i32, tid: i32) -> Result<Self, TraceError> {
        let path = dir.join(data_file_name(tid));
        let file = File::create(&path).map_err(|e| TraceError::file(&path, e))?;
        let mut writer = Self::new(BufWriter::new(file), pid, tid)?;
        writer.flush()?;
        Ok(writer)
    }
}

impl<W: Write> TaskWriter<W> {
    pub fn new(mut writer: W, pid: i32, tid: i32) -> Result<Self, TraceError> {
        writer.write_all(&encode_header(pid, tid))?;
        Ok(Self {
            writer,
            frame: Vec::new(),
            records: 0,
        })
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write_entry(&mut self, timestamp: u64, name: &str) -> Result<(), TraceError> {
        self.write_record(&Record {
            timestamp,
            kind: RecordKind::Entry { name },
        })
    }

    pub fn write_exit(&mut self, timestamp: u64, name: &str) -> Result<(), TraceError> {
        self.write_record(&Record {
            timestamp,
            kind: RecordKind::Exit { name },
        })
    }

    pub fn write_meta(&mut self, timestamp: u64, field: &str, value: &str) -> Result<(), TraceError> {
        self.write_record(&Record {
            timestamp,
            kind: RecordKind::Meta { field, value },
        })
    }

    pub fn write_record(&mut self, record: &Record<'_>) -> Result<(), TraceError> {
        let bytes = encode_record(record)?;
        let len = u32::try_from(bytes.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "record too large")
        })?;
        self.frame.clear();
        self.frame.extend_from_slice(&len.to_le_bytes());
        self.frame.extend_from_slice(&bytes);
        self.writer.write_all(&self.frame)?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TraceError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HEADER_LEN;

    #[test]
    fn test_frames_are_length_prefixed() {
        let mut writer = TaskWriter::new(Vec::new(), 1, 2).unwrap();
        writer.write_entry(10, "main").unwrap();
        writer.write_meta(11, "task", "foo").unwrap();
        assert_eq!(writer.records(), 2);

        let bytes = writer.into_inner();
        let mut offset = HEADER_LEN;
        let mut frames = 0;
        while offset < bytes.len() {
            let mut len = [0u8; 4];
            len.copy_from_slice(&bytes[offset..offset + 4]);
            offset += 4 + u32::from_le_bytes(len) as usize;
            frames += 1;
        }
        assert_eq!(offset, bytes.len());
        assert_eq!(frames, 2);
    }

    #[test]
    fn test_created_file_holds_header_before_any_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let _writer = TaskWriter::create(dir.path(), 3, 4).unwrap();

        let path = dir.path().join(data_file_name(4));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_LEN as u64);
    }

    #[test]
    fn test_flushed_record_is_a_whole_frame() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = TaskWriter::create(dir.path(), 3, 4).unwrap();
        writer.write_entry(1, "stuck").unwrap();
        writer.flush().unwrap();

        // a process killed here leaves exactly this file behind
        let path = dir.path().join(data_file_name(4));
        let bytes = std::fs::read(&path).unwrap();
        let len = u32::from_le_bytes(bytes[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap());
        assert_eq!(bytes.len(), HEADER_LEN + 4 + len as usize);
    }
}
