use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open trace file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write trace line: {0}")]
    Write(#[source] io::Error),
    #[error("failed to close trace file: {0}")]
    Close(#[source] io::Error),
    #[error("trace file is already closed")]
    Closed,
}

/// Append-only trace file. Lines are written in call order, one at a time,
/// and handed to the OS before the call returns.
#[derive(Debug)]
pub struct TraceSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
    lines_written: AtomicU64,
    failed_writes: AtomicU64,
}

impl TraceSink {
    /// Opens `path` for appending, creating it if absent. Existing content is kept.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "opened trace file");

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            lines_written: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `line` plus a newline. Failures are logged and counted, never returned.
    pub async fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line).await {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(path = %self.path.display(), error = %e, "dropped trace line");
        }
    }

    async fn try_append(&self, line: &str) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(SinkError::Closed)?;

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .await
            .map_err(SinkError::Write)?;
        file.flush().await.map_err(SinkError::Write)?;

        self.lines_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Flushes and closes the file. Later appends are dropped.
    pub async fn close(&self) -> Result<(), SinkError> {
        let file = self.file.lock().await.take();
        let mut file = file.ok_or(SinkError::Closed)?;
        file.flush().await.map_err(SinkError::Close)?;
        file.sync_all().await.map_err(SinkError::Close)?;
        tracing::info!(
            path = %self.path.display(),
            lines = self.lines_written(),
            failed = self.failed_writes(),
            "closed trace file"
        );
        Ok(())
    }
}
