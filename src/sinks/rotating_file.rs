//! Size-based rotating log file
//!
//! When the active file reaches its size limit it is renamed to `<name>.1`,
//! older backups shift up by one (`<name>.1` to `<name>.2` and so on) and the
//! oldest beyond the backup limit is deleted. Backups can optionally be
//! gzip-compressed to `<name>.<n>.gz`.

use crate::core::error::{OutputError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const MEGABYTE: u64 = 1024 * 1024;

/// When and how to rotate
///
/// # Examples
///
/// ```
/// use rust_output_system::sinks::RotationPolicy;
///
/// let policy = RotationPolicy::new()
///     .with_max_size(50 * 1024 * 1024)
///     .with_max_backups(7)
///     .with_compression(true);
/// assert!(policy.rotates());
///
/// assert!(!RotationPolicy::new().with_max_backups(0).rotates());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size that triggers a rotation; 0 disables rotation
    pub max_bytes: u64,
    /// Number of backups kept; 0 disables rotation
    pub max_backups: usize,
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * MEGABYTE,
            max_backups: 5,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy from a size in megabytes and a backup count
    #[must_use]
    pub fn megabytes(max_mb: u64, max_backups: usize) -> Self {
        Self {
            max_bytes: max_mb.saturating_mul(MEGABYTE),
            max_backups,
            compress: false,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn rotates(&self) -> bool {
        self.max_bytes > 0 && self.max_backups > 0
    }
}

/// Append-only log file with size-based rotation
///
/// # Examples
///
/// ```no_run
/// use rust_output_system::sinks::{RotatingFile, RotationPolicy};
/// use std::io::Write;
///
/// let mut file = RotatingFile::open("/var/log/app.log", RotationPolicy::megabytes(10, 3)).unwrap();
/// file.write_all(b"started\n").unwrap();
/// ```
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    writer: Option<BufWriter<File>>,
    current_size: u64,
}

impl RotatingFile {
    /// Open `path` for appending, creating missing parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the directory or the file cannot be created
    pub fn open<P: AsRef<Path>>(path: P, policy: RotationPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                OutputError::io_operation(
                    "creating log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let (file, current_size) = Self::open_file(&path)?;

        Ok(Self {
            path,
            policy,
            writer: Some(BufWriter::new(file)),
            current_size,
        })
    }

    fn open_file(path: &Path) -> Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                OutputError::file_write(path.display().to_string(), format!("Failed to open: {}", e))
            })?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok((file, size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Path of backup number `index`
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output.log");
        let suffix = if self.policy.compress { ".gz" } else { "" };
        self.path.with_file_name(format!("{}.{}{}", name, index, suffix))
    }

    fn should_rotate(&self) -> bool {
        self.policy.rotates() && self.current_size >= self.policy.max_bytes
    }

    /// Rotate now, regardless of size
    pub fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                OutputError::file_rotation(
                    self.path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        let oldest = self.backup_path(self.policy.max_backups);
        if oldest.exists() {
            if let Err(e) = fs::remove_file(&oldest) {
                eprintln!(
                    "[OUTPUT ERROR] Failed to remove oldest backup {}: {}",
                    oldest.display(),
                    e
                );
            }
        }

        for index in (1..self.policy.max_backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                let to = self.backup_path(index + 1);
                fs::rename(&from, &to).map_err(|e| {
                    OutputError::file_rotation(
                        from.display().to_string(),
                        format!("Failed to shift backup: {}", e),
                    )
                })?;
            }
        }

        if self.path.exists() {
            let first = self.backup_path(1);
            if self.policy.compress {
                compress_into(&self.path, &first)?;
                fs::remove_file(&self.path).map_err(|e| {
                    OutputError::file_rotation(
                        self.path.display().to_string(),
                        format!("Failed to remove compressed log: {}", e),
                    )
                })?;
            } else {
                fs::rename(&self.path, &first).map_err(|e| {
                    OutputError::file_rotation(
                        self.path.display().to_string(),
                        format!("Failed to rotate current log file: {}", e),
                    )
                })?;
            }
        }

        let (file, size) = Self::open_file(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_size = size;
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let (file, size) = Self::open_file(&self.path)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            self.writer = Some(BufWriter::new(file));
            self.current_size = size;
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file not open"))
    }
}

/// Gzip `source` into `target` through a temporary file
fn compress_into(source: &Path, target: &Path) -> Result<()> {
    let temp = target.with_extension("gz.tmp");
    let result = (|| -> io::Result<()> {
        let mut input = File::open(source)?;
        let output = BufWriter::new(File::create(&temp)?);
        let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.flush()?;
        fs::rename(&temp, target)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&temp);
        OutputError::io_operation(
            "compressing log file",
            format!("Failed to compress {}", source.display()),
            e,
        )
    })
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_rotate() {
            if let Err(e) = self.rotate() {
                eprintln!(
                    "[OUTPUT ERROR] Log rotation failed: {}. Continuing with current file.",
                    e
                );
                // Allow the file to outgrow the limit instead of retrying
                // on every write.
                self.current_size = 0;
            }
        }

        let writer = self.writer()?;
        writer.write_all(buf)?;
        self.current_size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RotatingFile {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.log");
        let mut file = RotatingFile::open(&path, RotationPolicy::new()).unwrap();
        file.write_all(b"hello\n").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_rotates_when_size_reached() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new().with_max_size(10).with_max_backups(2);
        let mut file = RotatingFile::open(&path, policy).unwrap();

        file.write_all(b"0123456789").unwrap();
        file.write_all(b"second\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("app.log.1")).unwrap(), "0123456789");
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn test_keeps_at_most_max_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new().with_max_size(4).with_max_backups(2);
        let mut file = RotatingFile::open(&path, policy).unwrap();

        for chunk in [b"aaaa", b"bbbb", b"cccc", b"dddd"] {
            file.write_all(chunk).unwrap();
        }
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddd");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.1")).unwrap(), "cccc");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.2")).unwrap(), "bbbb");
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_zero_backups_never_rotates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new().with_max_size(2).with_max_backups(0);
        let mut file = RotatingFile::open(&path, policy).unwrap();
        file.write_all(b"abcdef").unwrap();
        file.write_all(b"ghi").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefghi");
        assert!(!dir.path().join("app.log.1").exists());
    }

    #[test]
    fn test_compressed_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_max_size(5)
            .with_max_backups(3)
            .with_compression(true);
        let mut file = RotatingFile::open(&path, policy).unwrap();

        file.write_all(b"first").unwrap();
        file.write_all(b"next").unwrap();
        file.flush().unwrap();

        let gz = dir.path().join("app.log.1.gz");
        assert!(gz.exists());
        let mut decoder = flate2::read::GzDecoder::new(File::open(gz).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "first");
        assert!(!dir.path().join("app.log.1").exists());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        {
            let mut file = RotatingFile::open(&path, RotationPolicy::new()).unwrap();
            file.write_all(b"one\n").unwrap();
        }
        let mut file = RotatingFile::open(&path, RotationPolicy::new()).unwrap();
        assert_eq!(file.current_size(), 4);
        file.write_all(b"two\n").unwrap();
        file.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
