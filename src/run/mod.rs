//! Run driver: walks source tickets in source order and imports each one.
//!
//! Only fatal errors (cache build, source listing, authentication, local
//! storage) stop a run. Everything scoped to one ticket, including a thread
//! that fails to load, becomes a `failed` record and the run moves on.

mod log;

pub use log::{RunLog, format_record};

use crate::api::SourceApi;
use crate::error::{FerryError, Result};
use crate::import::{TicketImporter, assemble_ticket};
use crate::model::{ImportOutcome, ImportRecord, SourceTicket, SourceTicketHeader};
use crate::util::normalize_key;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Selection and display options for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only import tickets of these customers (case-insensitive). Empty means all.
    pub customers: Vec<String>,
    /// Stop after this many selected tickets.
    pub limit: Option<usize>,
    pub show_progress: bool,
}

impl RunOptions {
    fn selects(&self, header: &SourceTicketHeader) -> bool {
        if self.customers.is_empty() {
            return true;
        }
        let customer = normalize_key(&header.customer);
        self.customers.iter().any(|c| normalize_key(c) == customer)
    }
}

/// Outcome counts for a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub skipped_duplicate: usize,
    pub skipped_cutoff: usize,
    pub failed: usize,
    pub comments_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub records: Vec<ImportRecord>,
}

impl RunSummary {
    #[must_use]
    pub fn from_records(records: Vec<ImportRecord>) -> Self {
        let mut summary = Self::default();
        for record in &records {
            match record.outcome {
                ImportOutcome::Created => summary.created += 1,
                ImportOutcome::SkippedDuplicate => summary.skipped_duplicate += 1,
                ImportOutcome::SkippedCutoff => summary.skipped_cutoff += 1,
                ImportOutcome::Failed => summary.failed += 1,
            }
            summary.comments_created += record.comments_created;
        }
        summary.records = records;
        summary
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.skipped_duplicate + self.skipped_cutoff + self.failed
    }

    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped_duplicate + self.skipped_cutoff
    }
}

/// Drives a [`TicketImporter`] over a whole run, logging every record.
pub struct RunDriver<'a> {
    importer: TicketImporter<'a>,
    log: RunLog,
}

impl<'a> RunDriver<'a> {
    #[must_use]
    pub const fn new(importer: TicketImporter<'a>, log: RunLog) -> Self {
        Self { importer, log }
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log.path().to_path_buf()
    }

    /// Import already assembled tickets in the given order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; records produced before it are logged.
    pub fn run_all(&mut self, tickets: &[SourceTicket]) -> Result<Vec<ImportRecord>> {
        let mut records = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let record = self.importer.import(ticket);
            records.push(self.settle(record)?);
        }
        self.importer.record_run(Utc::now())?;
        Ok(records)
    }

    /// List tickets from the source and import every selected one.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the listing fails, credentials are rejected,
    /// or the local store cannot be written.
    pub fn run_from_source(
        &mut self,
        source: &dyn SourceApi,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        let headers = match source.list_tickets() {
            Ok(headers) => headers,
            Err(source_err) => {
                let err = FerryError::source_listing(source_err);
                self.log.abort(&err.to_string())?;
                return Err(err);
            }
        };
        let listed = headers.len();

        let selected: Vec<SourceTicketHeader> = headers
            .into_iter()
            .filter(|header| options.selects(header))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        info!(listed, selected = selected.len(), "Listed source tickets");

        let progress = progress_bar(selected.len(), options.show_progress);
        let mut records = Vec::with_capacity(selected.len());

        for header in selected {
            progress.set_message(header.display_id.clone());
            let record = self.import_header(source, header);
            let record = match self.settle(record) {
                Ok(record) => record,
                Err(err) => {
                    progress.abandon();
                    return Err(err);
                }
            };
            records.push(record);
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.importer.record_run(Utc::now())?;

        let mut summary = RunSummary::from_records(records);
        summary.log_path = Some(self.log_path());
        info!(
            created = summary.created,
            skipped = summary.skipped(),
            failed = summary.failed,
            "Run finished"
        );
        Ok(summary)
    }

    fn import_header(
        &mut self,
        source: &dyn SourceApi,
        header: SourceTicketHeader,
    ) -> Result<ImportRecord> {
        if let Some(record) = self.importer.precheck(&header)? {
            return Ok(record);
        }

        let entries = match source.list_conversations(&header.ticket_id) {
            Ok(entries) => entries,
            Err(source_err) => {
                let err = FerryError::thread(header.display_id.as_str(), source_err);
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(source_id = %header.display_id, error = %err, "Could not load thread");
                return Ok(ImportRecord::failed(
                    &header.display_id,
                    None,
                    0,
                    &err.to_string(),
                ));
            }
        };
        debug!(source_id = %header.display_id, entries = entries.len(), "Loaded thread");

        let ticket = assemble_ticket(header, entries);
        self.importer.import(&ticket)
    }

    /// Log a record, or the fatal error that replaced it.
    fn settle(&mut self, record: Result<ImportRecord>) -> Result<ImportRecord> {
        match record {
            Ok(record) => {
                self.log.append(&record)?;
                Ok(record)
            }
            Err(err) => {
                error!(error = %err, "Run aborted");
                self.log.abort(&err.to_string())?;
                Err(err)
            }
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner} [{bar:30}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header(customer: &str) -> SourceTicketHeader {
        SourceTicketHeader {
            ticket_id: "t".to_string(),
            display_id: "1".to_string(),
            subject: "s".to_string(),
            customer: customer.to_string(),
            status: None,
            priority: None,
            issue_type: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn customer_filter_is_case_insensitive() {
        let options = RunOptions {
            customers: vec!["acme  corp".to_string()],
            ..RunOptions::default()
        };
        assert!(options.selects(&header("Acme Corp")));
        assert!(!options.selects(&header("Globex")));
        assert!(RunOptions::default().selects(&header("Globex")));
    }

    #[test]
    fn summary_counts_outcomes() {
        let summary = RunSummary::from_records(vec![
            ImportRecord::created("1", "10", 3),
            ImportRecord::skipped_duplicate("2", Some("11")),
            ImportRecord::skipped_cutoff("3"),
            ImportRecord::failed("4", Some("12"), 1, "boom"),
        ]);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.comments_created, 4);
        assert_eq!(summary.total(), 4);
    }
}
