use eyre::{bail, eyre, Context, Result};
use protocol::{TraceInfo, INFO_FILE, TRACE_DIR_ENV};
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct RecordOutcome {
    pub status: ExitStatus,
    pub info: TraceInfo,
}

/// Empties `dir` for a new recording.
///
/// Refuses to clear a non-empty directory that holds no `info` file.
pub fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        let has_entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
            .next()
            .is_some();
        if has_entries && !dir.join(INFO_FILE).exists() {
            bail!(
                "{} is not empty and does not hold a previous trace",
                dir.display()
            );
        }
        fs::remove_dir_all(dir).with_context(|| format!("failed to remove {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}

/// Runs `command` with the trace directory exported and writes the
/// `info` file once it exits, whatever its status.
pub fn record(dir: &Path, command: &[String]) -> Result<RecordOutcome> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| eyre!("no command to record"))?;
    prepare_dir(dir)?;

    info!(program = %program, dir = %dir.display(), "recording");
    let status = Command::new(program)
        .args(args)
        .env(TRACE_DIR_ENV, dir)
        .status()
        .with_context(|| format!("failed to run {}", program))?;
    debug!(?status, "program exited");

    let mut info = TraceInfo::new(command.to_vec());
    info.exit_code = status.code();
    info.tasks = TraceInfo::scan_tasks(dir)?;
    info.save(dir)?;

    if info.tasks.is_empty() {
        warn!(program = %program, "no data was recorded; is the program instrumented?");
    }
    Ok(RecordOutcome { status, info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::TaskWriter;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_dir_replaces_previous_trace() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("trace");
        fs::create_dir(&dir).unwrap();
        TraceInfo::new(vec!["old".to_string()]).save(&dir).unwrap();
        TaskWriter::create(&dir, 1, 1).unwrap().flush().unwrap();

        prepare_dir(&dir).unwrap();
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_dir_keeps_unrelated_files() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("notes.txt"), "keep me").unwrap();

        assert!(prepare_dir(root.path()).is_err());
        assert!(root.path().join("notes.txt").exists());
    }

    #[test]
    fn test_record_uninstrumented_program() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("trace");

        let outcome = record(&dir, &["true".to_string()]).unwrap();
        assert!(outcome.status.success());
        assert!(outcome.info.tasks.is_empty());

        let info = TraceInfo::load(&dir).unwrap();
        assert_eq!(info.command, ["true"]);
        assert_eq!(info.exit_code, Some(0));
    }

    #[test]
    fn test_record_reports_failure_status() {
        let root = TempDir::new().unwrap();
        let outcome = record(&root.path().join("trace"), &["false".to_string()]).unwrap();
        assert!(!outcome.status.success());
        assert_eq!(outcome.info.exit_code, Some(1));
    }

    #[test]
    fn test_record_missing_program() {
        let root = TempDir::new().unwrap();
        let command = ["/nonexistent/program".to_string()];
        assert!(record(&root.path().join("trace"), &command).is_err());
        assert!(record(&root.path().join("trace"), &[]).is_err());
    }
}
