use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::Client;
use stampede::prelude::*;
use stampede::report;
use stampede_core::{parse_run_time, QUICK_RUN_TIME, QUICK_SPAWN_RATE, QUICK_USERS};
use stampede_scenarios::calc::VuHours;
use stampede_scenarios::datadog::{DatadogConfig, DatadogReporter, ReporterError};
use stampede_scenarios::scenario::{Scenario, ScenarioEnv};
use stampede_scenarios::settings::{AuthArgs, RedisArgs, TargetArgs};
use stampede_scenarios::Credentials;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_LOG_FILTER: &str = "stampede=info,stampede_scenarios=info";

#[derive(Parser)]
#[command(name = "stampede", version, about = "Run load-test scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario headless until the run time elapses or Ctrl-C.
    Run(RunArgs),
    /// A short validation run: 10 users, 2 per second, one minute.
    Quick(QuickArgs),
    /// List the available scenarios.
    List,
    /// Check that the environment is configured.
    Check,
    /// Work out how many VU hours a run would use.
    Calc {
        #[arg(long)]
        users: usize,
        /// e.g. 2h, 30m, 1h30m
        #[arg(long, value_parser = parse_run_time)]
        duration: Duration,
    },
    /// Log in once with the configured credentials.
    Auth {
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    scenario: Scenario,

    #[arg(long, short)]
    users: usize,

    /// Users started per second. Defaults to a tenth of the users, at least one.
    #[arg(long, short = 'r')]
    spawn_rate: Option<f64>,

    /// e.g. 30s, 2h, 1h30m. Runs until Ctrl-C when omitted.
    #[arg(long, short = 't', value_parser = parse_run_time)]
    run_time: Option<Duration>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct QuickArgs {
    scenario: Scenario,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[command(flatten)]
    auth: AuthArgs,

    #[command(flatten)]
    redis: RedisArgs,

    /// Write `<prefix>_stats.csv` and `<prefix>_failures.csv` when the run stops.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Serve Prometheus metrics on this address during the run.
    #[arg(long)]
    prometheus: Option<SocketAddr>,

    /// Forward metrics and events to Datadog. Needs DATADOG_API_KEY and DATADOG_APP_KEY.
    #[arg(long, env = "DATADOG_ENABLED")]
    datadog: bool,

    /// Turns Datadog forwarding on by itself when set.
    #[arg(long, env = "DATADOG_API_KEY", hide_env_values = true)]
    datadog_api_key: Option<String>,
}

impl CommonArgs {
    fn datadog_api_key(&self) -> Option<&str> {
        self.datadog_api_key.as_deref().filter(|key| !key.is_empty())
    }

    fn datadog_enabled(&self) -> bool {
        self.datadog || self.datadog_api_key().is_some()
    }

    fn datadog_config(&self) -> Result<DatadogConfig, ReporterError> {
        let api_key = self.datadog_api_key().map(str::to_string);
        DatadogConfig::from_lookup(|key| match key {
            "DATADOG_API_KEY" => api_key.clone(),
            _ => std::env::var(key).ok(),
        })
    }
}

fn default_spawn_rate(users: usize) -> f64 {
    (users / 10).max(1) as f64
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = dotenvy::dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    if let Some(path) = env_file {
        debug!("Loaded {}", path.display());
    }

    match Cli::parse().command {
        Command::Run(args) => {
            let spawn_rate = args.spawn_rate.unwrap_or_else(|| default_spawn_rate(args.users));
            run(args.scenario, args.users, spawn_rate, args.run_time, args.common).await
        }
        Command::Quick(args) => {
            println!("Running quick test ({QUICK_USERS} users, 1 minute)\n");
            run(
                args.scenario,
                QUICK_USERS,
                QUICK_SPAWN_RATE,
                Some(QUICK_RUN_TIME),
                args.common,
            )
            .await
        }
        Command::List => {
            println!("Available scenarios:\n");
            for (i, scenario) in Scenario::all().iter().enumerate() {
                println!("{}. {scenario}\n   {}\n", i + 1, scenario.description());
            }
            Ok(())
        }
        Command::Check => check(),
        Command::Calc { users, duration } => {
            println!("{}", VuHours::new(users, duration));
            Ok(())
        }
        Command::Auth { auth } => login(auth).await,
    }
}

async fn run(
    scenario: Scenario,
    users: usize,
    spawn_rate: f64,
    run_time: Option<Duration>,
    common: CommonArgs,
) -> Result<()> {
    let host = common.target.host()?;

    let mut config = RunConfig::new(scenario.name(), &host)
        .users(users)
        .spawn_rate(spawn_rate);
    if let Some(run_time) = run_time {
        config = config.run_time(run_time);
    }

    println!("Target: {host}");
    println!("Scenario: {scenario}");
    println!("Users: {users}");
    match run_time {
        Some(run_time) => println!("Duration: {}", humantime::format_duration(run_time)),
        None => println!("Duration: until Ctrl-C"),
    }
    println!("Spawn rate: {spawn_rate}/sec\n");

    if let Some(addr) = common.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start the Prometheus exporter")?;
        info!("Serving Prometheus metrics on {addr}");
    }

    let client = Client::builder()
        .build()
        .context("Failed to build the HTTP client")?;

    let datadog = if common.datadog_enabled() {
        Some(common.datadog_config()?)
    } else {
        None
    };

    let env = ScenarioEnv {
        client: client.clone(),
        host,
        auth: common.auth,
        redis: common.redis,
    };
    let mut swarm = scenario.register(Swarm::new(config), &env)?;

    let reporter = if let Some(datadog) = datadog {
        info!("Enabling Datadog integration");
        let reporter = DatadogReporter::from_config(client, &datadog);
        swarm = swarm.listener(reporter.clone());
        Some(reporter)
    } else {
        info!("Datadog integration not configured");
        None
    };

    let snapshot = swarm.run().await?;

    if let Some(reporter) = reporter {
        reporter.shutdown().await;
    }

    println!("\n{}", report::summary_table(&snapshot));

    if let Some(prefix) = common.csv {
        let [stats, failures] = report::write_csv_files(&snapshot, &prefix)?;
        println!("CSV data: {} {}", stats.display(), failures.display());
    }

    Ok(())
}

fn check() -> Result<()> {
    println!("Checking environment...");

    if !Path::new(".env").exists() {
        println!(".env file not found");
        println!("Copy .env.example to .env and fill in your values:");
        println!("   cp .env.example .env");
        bail!("environment is not configured");
    }
    println!(".env found");

    match std::env::var("TARGET_HOST") {
        Ok(host) if !host.is_empty() => println!("Target host: {host}"),
        _ => {
            println!("TARGET_HOST not set in .env");
            println!("This is optional if you provide --host in commands");
        }
    }
    Ok(())
}

async fn login(auth: AuthArgs) -> Result<()> {
    let credentials: Credentials = auth.credentials()?;
    let identity = auth.identity(Client::new())?;

    println!("Testing identity service authentication...");
    println!("Base URL: {}", identity.base_uri());
    println!("Username: {}\n", credentials.login_id);

    let token = identity
        .login(&credentials)
        .await
        .context(
            "Authentication failed. Check that FUSION_AUTH_BASE_URI does not include /api/login",
        )?;

    let preview: String = token.chars().take(40).collect();
    println!("Authentication successful");
    println!("Token (first 40 chars): {preview}...");
    println!("Token length: {} characters", token.len());
    Ok(())
}
