//! Size-capped log file used as a `tracing` writer.
//!
//! Before every write the file is checked against the cap. Once it grows past
//! it, only the trailing half is kept and a timestamped marker is appended.

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::time::SystemTime;

/// Default size cap (30 KiB).
pub const DEFAULT_MAX_LOG_BYTES: u64 = 30 * 1024;

const TRUNCATION_MARKER: &str = "Log file truncated to half size";

/// Append-only log file with a size cap.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
    max_bytes: u64,
    lock: Arc<Mutex<()>>,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_cap(path, DEFAULT_MAX_LOG_BYTES)
    }

    pub fn with_cap(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw bytes, truncating first if the file is over the cap.
    pub fn append(&self, buf: &[u8]) -> io::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;

        self.truncate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf)
    }

    fn truncate_if_needed(&self) -> io::Result<()> {
        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if len <= self.max_bytes {
            return Ok(());
        }

        let content = fs::read(&self.path)?;
        let keep = usize::try_from(self.max_bytes / 2).unwrap_or(usize::MAX);
        let mut tail = trailing_bytes(&content, keep).to_vec();
        tail.extend_from_slice(format!("{} - {}\n", timestamp(), TRUNCATION_MARKER).as_bytes());

        let tmp = self.path.with_extension("log.tmp");
        fs::write(&tmp, &tail)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Last `keep` bytes of `content`, starting at a line boundary when one exists.
fn trailing_bytes(content: &[u8], keep: usize) -> &[u8] {
    let start = content.len().saturating_sub(keep);
    let tail = &content[start..];
    if start == 0 {
        return tail;
    }
    match tail.iter().position(|b| *b == b'\n') {
        Some(newline) if newline + 1 < tail.len() => &tail[newline + 1..],
        _ => tail,
    }
}

/// Wall-clock timestamp in the same format as the fmt layer.
fn timestamp() -> String {
    let mut stamp = String::new();
    if SystemTime.format_time(&mut Writer::new(&mut stamp)).is_err() {
        stamp.clear();
    }
    stamp
}

/// Handle returned by [`LogFile::make_writer`].
pub struct LogFileWriter {
    file: LogFile,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter { file: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("test.log"));

        log.append(b"first\n").unwrap();
        log.append(b"second\n").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_truncates_to_trailing_half() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::with_cap(dir.path().join("test.log"), 100);

        let mut lines = String::new();
        for i in 0..20 {
            lines.push_str(&format!("line {i:02}\n"));
        }
        fs::write(log.path(), &lines).unwrap();

        log.append(b"after\n").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert!(!content.contains("line 00"));
        assert!(!content.contains("line 13"));
        assert!(content.starts_with("line 14\n"));
        assert!(content.contains("line 19"));
        assert!(content.contains(TRUNCATION_MARKER));
        assert!(content.ends_with("after\n"));
    }

    #[test]
    fn test_under_cap_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::with_cap(dir.path().join("test.log"), 1000);
        fs::write(log.path(), "existing\n").unwrap();

        log.append(b"more\n").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "existing\nmore\n");
    }

    #[test]
    fn test_trailing_bytes_line_boundary() {
        assert_eq!(trailing_bytes(b"aaaa\nbbbb\ncccc\n", 7), b"cccc\n");
        assert_eq!(trailing_bytes(b"short\n", 100), b"short\n");
    }

    #[test]
    fn test_make_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("test.log"));

        let mut writer = log.make_writer();
        writer.write_all(b"via writer\n").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "via writer\n");
    }
}
