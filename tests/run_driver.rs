//! Whole runs through `run_with`: snapshot, link store, run log, fakes.

mod common;

use chrono::Duration;
use common::fakes::FakeSource;
use common::fixtures::{acme_source, base_time, carl, header, reference_destination, standard_thread};
use common::{Workspace, default_config};
use ticket_ferry::FerryError;
use ticket_ferry::cli::commands::run::run_with;
use ticket_ferry::run::RunOptions;
use ticket_ferry::storage::{METADATA_LAST_RUN_AT, SqliteStorage};

fn read_log(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("read run log")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn second_run_creates_nothing() {
    let ws = Workspace::new();
    let source = acme_source(3);
    let destination = reference_destination();
    let config = default_config();
    let options = RunOptions::default();

    let first = run_with(&source, &destination, &ws.paths, &config, false, &options).expect("first run");
    assert_eq!(first.created, 3);
    assert_eq!(first.comments_created, 6);
    assert_eq!(first.failed, 0);

    let second = run_with(&source, &destination, &ws.paths, &config, false, &options).expect("second run");
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped_duplicate, 3);
    assert_eq!(destination.tickets.borrow().len(), 3);

    // Duplicates are screened before their threads are fetched.
    assert_eq!(source.thread_requests.borrow().len(), 3);
    assert_ne!(first.log_path, second.log_path);
}

#[test]
fn lost_link_store_still_deduplicates_by_subject_marker() {
    let ws = Workspace::new();
    let source = acme_source(2);
    let destination = reference_destination();
    let config = default_config();
    let options = RunOptions::default();

    run_with(&source, &destination, &ws.paths, &config, false, &options).expect("first run");
    std::fs::remove_file(&ws.paths.links_db).expect("remove link store");
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = ws.paths.links_db.clone().into_os_string();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(sidecar);
    }

    let second = run_with(&source, &destination, &ws.paths, &config, false, &options).expect("second run");
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped_duplicate, 2);
    assert_eq!(destination.tickets.borrow().len(), 2);

    let store = SqliteStorage::open(&ws.paths.links_db).expect("open store");
    assert_eq!(store.count_links(None).expect("count"), 2);
}

#[test]
fn thread_failure_skips_only_that_ticket() {
    let ws = Workspace::new();
    let mut source = acme_source(3);
    source.broken_threads.insert("so-1002".to_string());
    let destination = reference_destination();

    let summary = run_with(
        &source,
        &destination,
        &ws.paths,
        &default_config(),
        false,
        &RunOptions::default(),
    )
    .expect("run completes");

    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 1);
    let failed = summary
        .records
        .iter()
        .find(|r| r.error.is_some())
        .expect("failed record");
    assert_eq!(failed.source_id, "1002");

    let log_path = summary.log_path.expect("log path");
    let lines = read_log(&log_path);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains(" 1001 created dest="));
    assert!(lines[1].contains(" 1002 failed dest=- comments=0 error="));
    assert!(lines[2].contains(" 1003 created "));
}

#[test]
fn rejected_credentials_stop_the_run() {
    let ws = Workspace::new();
    let mut source = acme_source(3);
    source.unauthorized_threads.insert("so-1002".to_string());
    let destination = reference_destination();

    let err = run_with(
        &source,
        &destination,
        &ws.paths,
        &default_config(),
        false,
        &RunOptions::default(),
    )
    .expect_err("auth failure is fatal");

    assert!(matches!(err, FerryError::Auth { .. }));
    assert_eq!(destination.tickets.borrow().len(), 1);
    assert_eq!(source.thread_requests.borrow().len(), 2);

    let logs = ws.log_files();
    assert_eq!(logs.len(), 1);
    let lines = read_log(&logs[0]);
    assert!(lines[0].contains(" 1001 created "));
    assert!(lines[1].contains(" run aborted error="));
}

#[test]
fn source_listing_failure_is_fatal() {
    let ws = Workspace::new();
    let source = FakeSource {
        fail_listing: true,
        ..FakeSource::new()
    };
    let destination = reference_destination();

    let err = run_with(
        &source,
        &destination,
        &ws.paths,
        &default_config(),
        false,
        &RunOptions::default(),
    )
    .expect_err("listing failure is fatal");

    assert_eq!(err.exit_code(), 4);
    assert!(destination.tickets.borrow().is_empty());
    let lines = read_log(&ws.log_files()[0]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("run aborted"));
}

#[test]
fn customer_filter_and_limit_select_tickets() {
    let ws = Workspace::new();
    let source = acme_source(3).with_ticket(
        header("2001", "Email bounce", "Globex"),
        standard_thread(&carl()),
    );
    let destination = reference_destination();
    let config = default_config();

    let only_globex = RunOptions {
        customers: vec!["  GLOBEX ".to_string()],
        ..RunOptions::default()
    };
    let summary = run_with(&source, &destination, &ws.paths, &config, false, &only_globex).expect("run");
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.records[0].source_id, "2001");
    assert_eq!(destination.tickets.borrow()[0].1.customer_id, "11");

    let limited = RunOptions {
        limit: Some(2),
        ..RunOptions::default()
    };
    let summary = run_with(&source, &destination, &ws.paths, &config, false, &limited).expect("run");
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.created, 2);
    assert_eq!(destination.tickets.borrow().len(), 3);
}

#[test]
fn tickets_before_cutoff_are_skipped_without_loading_threads() {
    let ws = Workspace::new();
    let source = acme_source(2);
    let destination = reference_destination();
    let mut config = default_config();
    config.cutoff = Some(base_time() + Duration::days(1));

    let summary = run_with(&source, &destination, &ws.paths, &config, false, &RunOptions::default())
        .expect("run");

    assert_eq!(summary.skipped_cutoff, 2);
    assert_eq!(summary.created, 0);
    assert!(source.thread_requests.borrow().is_empty());
    assert!(destination.tickets.borrow().is_empty());
}

#[test]
fn finished_run_is_stamped_in_link_store() {
    let ws = Workspace::new();
    run_with(
        &acme_source(1),
        &reference_destination(),
        &ws.paths,
        &default_config(),
        false,
        &RunOptions::default(),
    )
    .expect("run");

    let store = SqliteStorage::open(&ws.paths.links_db).expect("open store");
    assert!(store.get_metadata(METADATA_LAST_RUN_AT).expect("metadata").is_some());
}
