//! Progress-file writer and reader.
//!
//! Writers replace the whole file through a uniquely named sibling temp file and `rename`, so a
//! concurrent reader sees either the previous or the new record, never a partial one, and
//! concurrent writers never share a scratch file.
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use mirctl_model::{ProgressRecord, ResponseCode, TaskState};
use mirctl_observe::log_progress;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::CoreError;

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fractional seconds since the unix epoch.
pub fn unix_now_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Writes the progress file of one task.
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    path: PathBuf,
    task_id: String,
}

impl ProgressWriter {
    pub fn new(path: impl Into<PathBuf>, task_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            task_id: task_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, rec: &ProgressRecord) -> Result<(), CoreError> {
        log_progress(rec);
        write_atomic(&self.path, rec.to_lines().as_bytes())
    }

    pub fn pending(&self) -> Result<(), CoreError> {
        self.write(&ProgressRecord::new(
            &self.task_id,
            unix_now(),
            0.0,
            TaskState::Pending,
        ))
    }

    pub fn running(&self, percent: f64) -> Result<(), CoreError> {
        self.write(&ProgressRecord::new(
            &self.task_id,
            unix_now(),
            percent,
            TaskState::Running,
        ))
    }

    pub fn done(&self) -> Result<(), CoreError> {
        self.write(&ProgressRecord::new(
            &self.task_id,
            unix_now(),
            1.0,
            TaskState::Done,
        ))
    }

    pub fn failed(
        &self,
        code: ResponseCode,
        message: &str,
        trace: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut rec = ProgressRecord::failed(&self.task_id, unix_now(), code, message);
        if let Some(trace) = trace {
            rec = rec.with_stack_trace(trace);
        }
        self.write(&rec)
    }

    /// Like the typed writers, but a failed write only logs: progress reporting never
    /// changes the outcome of the task itself.
    pub fn report(&self, result: Result<(), CoreError>) {
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "progress write failed");
        }
    }
}

/// Read and parse the current record of a progress file.
pub fn read_progress(path: impl AsRef<Path>) -> Result<ProgressRecord, CoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(raw.parse::<ProgressRecord>()?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| CoreError::InvalidRequest(format!("no parent: {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: &str = "f0000001000042abcdef0123456789";

    #[test]
    fn done_line_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let w = ProgressWriter::new(dir.path().join("nested/monitor.txt"), TID);
        w.done().unwrap();

        let raw = fs::read_to_string(w.path()).unwrap();
        let fields: Vec<_> = raw.lines().next().unwrap().split('\t').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], TID);
        assert_eq!(fields[2], "1.00");
        assert_eq!(fields[3], "done");
    }

    #[test]
    fn later_writes_replace_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let w = ProgressWriter::new(dir.path().join("monitor.txt"), TID);
        w.running(0.5).unwrap();
        w.failed(ResponseCode::ExternalToolFailed, "merge failed\nexit 2", Some("trace"))
            .unwrap();

        let rec = read_progress(w.path()).unwrap();
        assert_eq!(rec.state, TaskState::Error);
        assert_eq!(rec.percent, 1.0);
        assert_eq!(rec.error_code, Some(ResponseCode::ExternalToolFailed));
        assert_eq!(rec.error_message.as_deref(), Some("merge failed exit 2"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn concurrent_writers_never_clash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.txt");

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let w = ProgressWriter::new(&path, TID);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        w.running(f64::from(n * 50 + i) / 400.0).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let rec = read_progress(&path).unwrap();
        assert_eq!(rec.state, TaskState::Running);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_progress(dir.path().join("none.txt")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
