//! Per-run import log.
//!
//! One file per run under `<ferry dir>/logs/`, one line per import record:
//!
//! ```text
//! 2024-05-01T12:00:00Z 1042 created dest=501 comments=2
//! 2024-05-01T12:00:03Z 1043 failed dest=- comments=0 error=Could not resolve customer 'X': ...
//! ```

use crate::error::Result;
use crate::model::ImportRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only writer for one run's import records.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    /// Create `run-<YYYYmmdd-HHMMSS>.log` in `dir`, adding a counter if the
    /// name is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create(dir: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = format!("run-{}", started_at.format("%Y%m%d-%H%M%S"));

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.log")
            } else {
                format!("{stem}-{attempt}.log")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        writer: BufWriter::new(file),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush, so the file survives a crash mid-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn append(&mut self, record: &ImportRecord) -> Result<()> {
        writeln!(self.writer, "{}", format_record(record, Utc::now()))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Note a fatal error that ended the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn abort(&mut self, reason: &str) -> Result<()> {
        writeln!(
            self.writer,
            "{} run aborted error={}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            single_line(reason)
        )?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Render one log line.
#[must_use]
pub fn format_record(record: &ImportRecord, at: DateTime<Utc>) -> String {
    let mut line = format!(
        "{} {} {} dest={} comments={}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.source_id,
        record.outcome,
        record.destination_id.as_deref().unwrap_or("-"),
        record.comments_created,
    );
    if let Some(error) = &record.error {
        line.push_str(" error=");
        line.push_str(&single_line(error));
    }
    line
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
