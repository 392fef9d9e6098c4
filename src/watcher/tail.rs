use std::{
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::{debug, info};

use crate::common::error::HelperError;

/// Identity of the file behind a path, used to spot replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Incremental reader over an append-only file.
///
/// Each `poll` returns only the complete lines appended since the previous
/// poll. A partial trailing line is held back until its newline arrives.
pub(crate) struct LogTail {
    path: PathBuf,
    file: Option<File>,
    identity: Option<FileIdentity>,
    offset: u64,
    pending: Vec<u8>,
    first_attempt: bool,
}

impl LogTail {
    // Upper bound on bytes consumed per poll so a huge backlog cannot starve
    // the actor's request handling.
    const MAX_READ_PER_POLL: u64 = 1024 * 1024;

    pub(crate) fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            identity: None,
            offset: 0,
            pending: Vec::new(),
            first_attempt: true,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub(crate) async fn poll(&mut self) -> Result<Vec<String>, HelperError> {
        let first_attempt = std::mem::replace(&mut self.first_attempt, false);

        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(error) => {
                self.close();
                return Err(self.unavailable(error));
            }
        };
        let identity = FileIdentity::of(&metadata);

        if self.file.is_none() {
            // History that predates startup is not replayed
            let start = if first_attempt { metadata.len() } else { 0 };
            self.open(start, identity).await?;
        } else if identity != self.identity {
            info!(path = %self.path.display(), "Log file replaced, reopening from start");
            self.open(0, identity).await?;
        } else if metadata.len() < self.offset {
            info!(path = %self.path.display(), "Log file truncated, reading from start");
            self.offset = 0;
            self.pending.clear();
        }

        if metadata.len() <= self.offset {
            return Ok(Vec::new());
        }
        self.read_appended(metadata.len()).await
    }

    pub(crate) fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "Log file closed");
        }
        self.identity = None;
        self.pending.clear();
    }

    async fn open(
        &mut self,
        start: u64,
        identity: Option<FileIdentity>,
    ) -> Result<(), HelperError> {
        let file = File::open(&self.path)
            .await
            .map_err(|error| self.unavailable(error))?;
        debug!(path = %self.path.display(), offset = start, "Log file opened");
        self.file = Some(file);
        self.identity = identity;
        self.offset = start;
        self.pending.clear();
        Ok(())
    }

    async fn read_appended(&mut self, len: u64) -> Result<Vec<String>, HelperError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let want = (len - self.offset).min(Self::MAX_READ_PER_POLL);
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity(want as usize);
        let read = file.take(want).read_to_end(&mut chunk).await?;
        self.offset += read as u64;
        self.pending.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }
        Ok(lines)
    }

    fn unavailable(&self, error: std::io::Error) -> HelperError {
        let reason = match error.kind() {
            ErrorKind::NotFound => "not found".to_string(),
            ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => error.to_string(),
        };
        HelperError::LogSourceUnavailable(format!("{} - {}", self.path.display(), reason))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_existing_content_is_skipped_and_new_lines_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        append(&path, "old line\n");

        let mut tail = LogTail::new(&path);
        assert!(tail.poll().await.unwrap().is_empty());

        append(&path, "first\nsecond\n");
        assert_eq!(tail.poll().await.unwrap(), vec!["first", "second"]);
        assert!(tail.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        append(&path, "");

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        append(&path, "half a ");
        assert!(tail.poll().await.unwrap().is_empty());
        append(&path, "line\r\n");
        assert_eq!(tail.poll().await.unwrap(), vec!["half a line"]);
    }

    #[tokio::test]
    async fn test_missing_file_then_created_reads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");

        let mut tail = LogTail::new(&path);
        assert!(matches!(
            tail.poll().await,
            Err(HelperError::LogSourceUnavailable(_))
        ));
        assert!(!tail.is_open());

        append(&path, "created later\n");
        assert_eq!(tail.poll().await.unwrap(), vec!["created later"]);
    }

    #[tokio::test]
    async fn test_truncation_restarts_from_beginning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        append(&path, "");

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        append(&path, "a fairly long line before truncation\n");
        assert_eq!(tail.poll().await.unwrap().len(), 1);

        std::fs::write(&path, "short\n").unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec!["short"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replaced_file_is_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        append(&path, "");

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        append(&path, "before rotation\n");
        assert_eq!(tail.poll().await.unwrap(), vec!["before rotation"]);

        let rotated = dir.path().join("Client.txt.1");
        std::fs::rename(&path, &rotated).unwrap();
        append(&path, "after rotation, longer than the old file\n");
        assert_eq!(
            tail.poll().await.unwrap(),
            vec!["after rotation, longer than the old file"]
        );
    }
}
