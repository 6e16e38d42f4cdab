/// Status file: writes operator-visible watchdog state as JSON on every change.
///
/// Uses atomic write pattern: write to temp file then rename.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    /// Watchdog process id.
    pub pid: u32,
    /// Supervised child process id, if one is running.
    pub child_pid: Option<u32>,
    /// Current watchdog state line.
    pub status: String,
    /// Last noteworthy event.
    pub message: String,
    /// Message queued for the child's next check-in.
    pub pending_message: String,
    pub last_update: DateTime<Utc>,
}

/// Errors from writing the status file.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => {
                write!(f, "failed to serialize status: {}", source)
            }
            StatusError::Write { path, source } => {
                write!(f, "failed to write status file {}: {}", path.display(), source)
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} to {}: {}",
                    from.display(),
                    to.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}

/// Manages the status file lifecycle.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data to the status file.
    ///
    /// Writes to a temporary file in the same directory, then renames
    /// so readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".procwatch.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write-through holder for the current status fields.
///
/// Best-effort: write failures are logged and swallowed, so a full disk
/// never feeds back into the supervision decisions.
pub struct StatusWriter {
    file: StatusFile,
    data: StatusData,
}

impl StatusWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: StatusFile::new(path),
            data: StatusData {
                pid: std::process::id(),
                child_pid: None,
                status: String::new(),
                message: String::new(),
                pending_message: String::new(),
                last_update: Utc::now(),
            },
        }
    }

    pub fn set_status(&mut self, msg: &str) {
        self.data.status = msg.to_string();
        self.flush();
    }

    pub fn set_message(&mut self, msg: &str) {
        self.data.message = msg.to_string();
        self.flush();
    }

    pub fn set_pending_message(&mut self, msg: &str) {
        self.data.pending_message = msg.to_string();
        self.flush();
    }

    pub fn set_child_pid(&mut self, pid: Option<u32>) {
        self.data.child_pid = pid;
        self.flush();
    }

    /// Remove the file on clean shutdown.
    pub fn remove(&self) {
        self.file.remove();
    }

    fn flush(&mut self) {
        self.data.last_update = Utc::now();
        if let Err(e) = self.file.write(&self.data) {
            tracing::warn!(error = %e, "status file write failed");
        }
    }
}
