//! Pass/fail gating on a finished run's stats CSV.
use stampede_core::{ThresholdMetric, ThresholdRule, AGGREGATED};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("Could not open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: \"{value}\" in column \"{column}\" is not a number")]
    NotANumber {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// A row whose value exceeded a limit.
#[derive(Clone, Debug, PartialEq)]
pub struct Breach {
    pub request_type: String,
    pub name: String,
    pub metric: ThresholdMetric,
    pub value: f64,
    pub limit: f64,
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.metric.unit();
        write!(
            f,
            "{} {}: {} ({:.2}{unit}) exceeds threshold ({:.2}{unit})",
            self.request_type, self.name, self.metric, self.value, self.limit
        )
    }
}

#[derive(Clone, Debug)]
pub struct ThresholdChecker {
    rules: Vec<ThresholdRule>,
}

impl Default for ThresholdChecker {
    fn default() -> Self {
        Self::new(ThresholdRule::defaults())
    }
}

impl ThresholdChecker {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn check_path(&self, path: &Path) -> Result<Vec<Breach>, ThresholdError> {
        let file = File::open(path).map_err(|source| ThresholdError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.check_reader(file)
    }

    /// Every breach in the table, in row order. Totals rows are skipped.
    pub fn check_reader<R: Read>(&self, reader: R) -> Result<Vec<Breach>, ThresholdError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);

        let type_col = position("Type");
        let name_col = position("Name");

        // A missing column reads as 0 in every row, like an empty cell.
        let columns: Vec<_> = self
            .rules
            .iter()
            .map(|rule| {
                let idx = position(rule.metric.column());
                if idx.is_none() {
                    debug!("No \"{}\" column, reading it as 0", rule.metric.column());
                }
                (rule, idx)
            })
            .collect();

        let mut breaches = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

            let request_type = cell(type_col);
            let name = cell(name_col);
            if request_type == AGGREGATED || (request_type.is_empty() && name == AGGREGATED) {
                continue;
            }

            for (rule, idx) in &columns {
                let raw = cell(*idx);
                let value = if raw.is_empty() {
                    0.
                } else {
                    raw.parse::<f64>().map_err(|_| ThresholdError::NotANumber {
                        row: i + 1,
                        column: rule.metric.column(),
                        value: raw.to_string(),
                    })?
                };

                if rule.breached_by(value) {
                    breaches.push(Breach {
                        request_type: request_type.to_string(),
                        name: name.to_string(),
                        metric: rule.metric,
                        value,
                        limit: rule.limit,
                    });
                }
            }
        }

        Ok(breaches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede::stats::RequestStats;
    use stampede_core::RequestEvent;
    use std::time::Duration;

    const HEADER: &str = "Type,Name,Request Count,Failure Count,Average Response Time,Failure %\n";

    fn check(csv: &str) -> Vec<Breach> {
        ThresholdChecker::default().check_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn slow_row_breaches() {
        let breaches = check(&format!("{HEADER}POST,LineItemRows,10,0,2500,0\n"));
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, ThresholdMetric::AvgResponseTime);
        assert_eq!(breaches[0].value, 2500.);
        assert_eq!(
            breaches[0].to_string(),
            "POST LineItemRows: Average response time (2500.00ms) exceeds threshold (2000.00ms)"
        );

        assert!(check(&format!("{HEADER}POST,LineItemRows,10,0,1500,0\n")).is_empty());
    }

    #[test]
    fn failure_rate_breaches() {
        let breaches = check(&format!("{HEADER}POST,AddMessageToConversations,10,1,100,10.00\n"));
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, ThresholdMetric::FailurePercent);
    }

    #[test]
    fn aggregated_rows_are_skipped() {
        let csv = format!("{HEADER}Aggregated,Aggregated,10,9,9000,90\n,Aggregated,10,9,9000,90\n");
        assert!(check(&csv).is_empty());
    }

    #[test]
    fn empty_cells_count_as_zero() {
        assert!(check(&format!("{HEADER}POST,LineItemRows,10,0,,\n")).is_empty());
        assert!(check(&format!("{HEADER}POST,LineItemRows\n")).is_empty());
    }

    #[test]
    fn p95_is_checked_when_present() {
        let csv = "Type,Name,Average Response Time,Failure %,95%\nGET,/,100,0,6000\n";
        let breaches = check(csv);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, ThresholdMetric::P95ResponseTime);
    }

    #[test]
    fn custom_limits() {
        let checker =
            ThresholdChecker::new(vec![ThresholdRule::new(ThresholdMetric::AvgResponseTime, 100.)]);
        let breaches = checker
            .check_reader(format!("{HEADER}POST,LineItemRows,10,0,150,50\n").as_bytes())
            .unwrap();
        assert_eq!(breaches.len(), 1);
    }

    #[test]
    fn stats_without_failure_column() {
        let header = "Type,Name,Request Count,Failure Count,Median Response Time,";
        let csv = format!("{header}Average Response Time\nPOST,LineItemRows,10,0,100,2500\n");
        let breaches = check(&csv);
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, ThresholdMetric::AvgResponseTime);
        assert_eq!(breaches[0].name, "LineItemRows");
    }

    #[test]
    fn missing_columns_read_as_zero() {
        assert!(check("Type,Name,Failure %\nGET,/,0\n").is_empty());
        assert!(check("Type,Name\nGET,/\n").is_empty());

        let breaches = check("Type,Name,Failure %\nGET,/,12.5\n");
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].metric, ThresholdMetric::FailurePercent);
    }

    #[test]
    fn garbage_cell() {
        let csv = format!("{HEADER}GET,/,1,0,fast,0\n");
        let res = ThresholdChecker::default().check_reader(csv.as_bytes());
        assert!(matches!(res, Err(ThresholdError::NotANumber { row: 1, .. })));
    }

    #[test]
    fn missing_file() {
        let res =
            ThresholdChecker::default().check_path(Path::new("/nonexistent/results_stats.csv"));
        assert!(matches!(res, Err(ThresholdError::Io { .. })));
    }

    #[test]
    fn stats_report_round_trip() {
        let stats = RequestStats::new();
        for ms in [3000, 3100, 2900] {
            let elapsed = Duration::from_millis(ms);
            stats.log(&RequestEvent::success("POST", "LineItemRows", elapsed, 10));
        }
        stats.log(&RequestEvent::success("GET", "/", Duration::from_millis(20), 10));

        let mut buf = Vec::new();
        stampede::report::write_stats(&stats.snapshot(), &mut buf).unwrap();
        let breaches = ThresholdChecker::default().check_reader(buf.as_slice()).unwrap();

        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].name, "LineItemRows");
        assert_eq!(breaches[0].metric, ThresholdMetric::AvgResponseTime);
    }
}
