//! CSV results and the console summary.
use crate::stats::{EntrySnapshot, StatsSnapshot};
use stampede_core::{AGGREGATED, REPORT_PERCENTILES};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub const STATS_HEADER: [&str; 12] = [
    "Type",
    "Name",
    "Request Count",
    "Failure Count",
    "Median Response Time",
    "Average Response Time",
    "Min Response Time",
    "Max Response Time",
    "Average Content Size",
    "Requests/s",
    "Failures/s",
    "Failure %",
];

pub const FAILURES_HEADER: [&str; 4] = ["Method", "Name", "Error", "Occurrences"];

fn percentile_label(quantile: f64) -> String {
    format!("{}%", (quantile * 100.).round() as u32)
}

fn stats_row(entry: &EntrySnapshot, request_type: &str) -> Vec<String> {
    let mut row = vec![
        request_type.to_string(),
        entry.name.clone(),
        entry.num_requests.to_string(),
        entry.num_failures.to_string(),
        format!("{:.0}", entry.median_response_time()),
        format!("{:.2}", entry.avg_response_time),
        format!("{:.2}", entry.min_response_time),
        format!("{:.2}", entry.max_response_time),
        format!("{:.2}", entry.avg_content_length),
        format!("{:.2}", entry.requests_per_second),
        format!("{:.2}", entry.failures_per_second),
        format!("{:.2}", entry.failure_percent()),
    ];
    row.extend(entry.percentiles.iter().map(|ms| format!("{ms:.0}")));
    row
}

/// Per-request rows followed by an `Aggregated` totals row.
pub fn write_stats<W: Write>(snapshot: &StatsSnapshot, writer: W) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = STATS_HEADER.iter().map(|h| h.to_string()).collect();
    header.extend(REPORT_PERCENTILES.iter().map(|q| percentile_label(*q)));
    wtr.write_record(&header)?;

    for entry in &snapshot.entries {
        wtr.write_record(stats_row(entry, &entry.request_type))?;
    }
    wtr.write_record(stats_row(&snapshot.total, AGGREGATED))?;

    wtr.flush()?;
    Ok(())
}

pub fn write_failures<W: Write>(snapshot: &StatsSnapshot, writer: W) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(FAILURES_HEADER)?;
    for failure in &snapshot.failures {
        wtr.write_record([
            failure.method.as_str(),
            failure.name.as_str(),
            failure.error.as_str(),
            failure.occurrences.to_string().as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `<prefix>_stats.csv` and `<prefix>_failures.csv`, creating the
/// parent directory when needed.
pub fn write_csv_files(
    snapshot: &StatsSnapshot,
    prefix: &Path,
) -> Result<[PathBuf; 2], ReportError> {
    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let base = prefix.as_os_str().to_string_lossy();
    let stats_path = PathBuf::from(format!("{base}_stats.csv"));
    let failures_path = PathBuf::from(format!("{base}_failures.csv"));

    write_stats(snapshot, File::create(&stats_path)?)?;
    write_failures(snapshot, File::create(&failures_path)?)?;

    Ok([stats_path, failures_path])
}

pub fn summary_table(snapshot: &StatsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<40} {:>8} {:>8} {:>10} {:>8} {:>8} {:>8} {:>8}",
        "Type", "Name", "# reqs", "# fails", "Avg", "Min", "Max", "Med", "req/s"
    );
    let _ = writeln!(out, "{}", "-".repeat(120));
    for entry in snapshot.entries.iter().chain(std::iter::once(&snapshot.total)) {
        let _ = writeln!(
            out,
            "{:<12} {:<40} {:>8} {:>8} {:>10.0} {:>8.0} {:>8.0} {:>8.0} {:>8.2}",
            truncate(&entry.request_type, 12),
            truncate(&entry.name, 40),
            entry.num_requests,
            format!("{}({:.2}%)", entry.num_failures, entry.failure_percent()),
            entry.avg_response_time,
            entry.min_response_time,
            entry.max_response_time,
            entry.median_response_time(),
            entry.requests_per_second,
        );
    }

    if !snapshot.failures.is_empty() {
        let _ = writeln!(out, "\nError report");
        for failure in &snapshot.failures {
            let _ = writeln!(
                out,
                "{:>8} {} {}: {}",
                failure.occurrences, failure.method, failure.name, failure.error
            );
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
