use clap::Parser;
use stampede_core::{
    ThresholdMetric, ThresholdRule, DEFAULT_AVG_RESPONSE_TIME_MS, DEFAULT_FAILURE_PERCENT,
    DEFAULT_P95_RESPONSE_TIME_MS,
};
use stampede_scenarios::thresholds::ThresholdChecker;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Fail a CI job when a load test's stats CSV breaches its limits.
#[derive(Parser)]
#[command(name = "check-thresholds", version)]
struct Cli {
    /// The `<prefix>_stats.csv` written by a run.
    csv: PathBuf,

    /// Limit on each row's average response time, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_AVG_RESPONSE_TIME_MS)]
    avg_ms: f64,

    /// Limit on each row's failure percentage.
    #[arg(long, default_value_t = DEFAULT_FAILURE_PERCENT)]
    failure_percent: f64,

    /// Limit on each row's 95th percentile, when the CSV has that column.
    #[arg(long, default_value_t = DEFAULT_P95_RESPONSE_TIME_MS)]
    p95_ms: f64,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stampede_scenarios=warn"));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let cli = Cli::parse();
    let checker = ThresholdChecker::new(vec![
        ThresholdRule::new(ThresholdMetric::AvgResponseTime, cli.avg_ms),
        ThresholdRule::new(ThresholdMetric::FailurePercent, cli.failure_percent),
        ThresholdRule::new(ThresholdMetric::P95ResponseTime, cli.p95_ms),
    ]);

    match checker.check_path(&cli.csv) {
        Ok(breaches) if breaches.is_empty() => {
            println!("All performance thresholds passed");
            ExitCode::SUCCESS
        }
        Ok(breaches) => {
            for breach in &breaches {
                println!("{breach}");
            }
            println!("\n{} threshold(s) breached", breaches.len());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}
