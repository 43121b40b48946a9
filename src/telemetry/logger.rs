//! Rotating JSONL traffic logger

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use super::types::TrafficRecord;
use crate::config::TelemetryConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "traffic_";
const FILE_EXTENSION: &str = "jsonl";

/// Writes [`TrafficRecord`]s as JSON lines
///
/// A new file is started after `max_records_per_file` records; only the
/// newest `max_files_to_keep` files are kept in `log_dir`.
pub struct TrafficLogger {
    log_dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files_created: u64,
}

impl TrafficLogger {
    /// Create the log directory and a logger writing into it
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(
        log_dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files_created: 0,
        })
    }

    /// Logger for the configured telemetry section, `None` when disabled
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
        )
        .map(Some)
    }

    /// Append one record, rotating files as needed
    ///
    /// # Errors
    ///
    /// Returns error on serialization or I/O failure
    pub fn log(&mut self, record: &TrafficRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(record)?;
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.files_created += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.files_created,
            FILE_EXTENSION
        );
        let path = self.log_dir.join(name);
        debug!("Opening traffic log {}", path.display());

        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old traffic log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Traffic log files currently in the directory
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.log_dir)? {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| {
                    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXTENSION)
                });
            if is_log {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl Drop for TrafficLogger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Frame;
    use crate::protocol::types::{BlindAction, ChannelMask, RadioIdentity};
    use tempfile::TempDir;

    fn record() -> TrafficRecord {
        TrafficRecord::sent(
            1,
            &RadioIdentity::new([0x12, 0xF0, 0x78, 0x09]),
            ChannelMask::new(0b1).unwrap(),
            BlindAction::Open,
            2,
            &Frame::finalize(&[0x12, 0xF0]).unwrap(),
        )
    }

    #[test]
    fn test_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut logger = TrafficLogger::new(dir.path(), 100, 5).unwrap();
        logger.log(&record()).unwrap();
        logger.log(&record()).unwrap();

        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["action"], "open");
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut logger = TrafficLogger::new(dir.path(), 2, 3).unwrap();
        for _ in 0..10 {
            logger.log(&record()).unwrap();
        }

        // 10 records at 2 per file make 5 files, of which 3 are kept
        let mut files = logger.log_files().unwrap();
        assert_eq!(files.len(), 3);

        files.sort();
        let newest = fs::read_to_string(files.last().unwrap()).unwrap();
        assert_eq!(newest.lines().count(), 2);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut logger = TrafficLogger::new(&nested, 10, 1).unwrap();
        logger.log(&record()).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_disabled_config_has_no_logger() {
        let config = TelemetryConfig::default();
        assert!(!config.enabled);
        assert!(TrafficLogger::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut logger = TrafficLogger::new(dir.path(), 1, 1).unwrap();
        logger.log(&record()).unwrap();
        logger.log(&record()).unwrap();

        assert_eq!(logger.log_files().unwrap().len(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }
}
