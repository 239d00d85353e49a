use crate::{decode_header, TraceError, DATA_EXTENSION, HEADER_LEN, INFO_FILE, VERSION};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceInfo {
    pub version: u32,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskInfo {
    pub tid: i32,
    pub pid: i32,
}

impl TraceInfo {
    pub fn new(command: Vec<String>) -> Self {
        TraceInfo {
            version: VERSION,
            command,
            exit_code: None,
            tasks: Vec::new(),
        }
    }

    pub fn load(dir: &Path) -> Result<Self, TraceError> {
        let path = dir.join(INFO_FILE);
        let content = fs::read_to_string(&path).map_err(|e| TraceError::file(&path, e))?;
        let info: TraceInfo = toml::from_str(&content)?;
        if info.version != VERSION {
            return Err(TraceError::malformed(
                path,
                format!("unsupported trace version {}", info.version),
            ));
        }
        Ok(info)
    }

    pub fn save(&self, dir: &Path) -> Result<(), TraceError> {
        let path = dir.join(INFO_FILE);
        let content = toml::to_string(self)?;
        fs::write(&path, content).map_err(|e| TraceError::file(&path, e))
    }

    /// Collects the tasks of every data file in `dir`, ordered by tid.
    ///
    /// A file too short to hold a header was cut off before the thread
    /// recorded anything and is skipped.
    pub fn scan_tasks(dir: &Path) -> Result<Vec<TaskInfo>, TraceError> {
        let mut tasks = Vec::new();
        let entries = fs::read_dir(dir).map_err(|e| TraceError::file(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| TraceError::file(dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DATA_EXTENSION) {
                continue;
            }

            let mut header = [0u8; HEADER_LEN];
            match File::open(&path).and_then(|mut file| file.read_exact(&mut header)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!(path = %path.display(), "skipping data file without a complete header");
                    continue;
                }
                Err(e) => return Err(TraceError::file(&path, e)),
            }
            let header = decode_header(&header).map_err(|reason| TraceError::malformed(&path, reason))?;
            tasks.push(TaskInfo {
                tid: header.tid,
                pid: header.pid,
            });
        }
        tasks.sort();
        Ok(tasks)
    }
}
