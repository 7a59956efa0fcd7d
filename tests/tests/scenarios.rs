mod utils;
#[allow(unused)]
use utils::*;

use mock_service::{MockConfig, MOCK_API_KEY, MOCK_LOGIN_ID, MOCK_PASSWORD};
use ntest::timeout;
use reqwest::Client;
use stampede::prelude::*;
use stampede::report;
use stampede::StatsSnapshot;
use stampede_core::{ThresholdMetric, ThresholdRule};
use stampede_scenarios::scenario::{Scenario, ScenarioEnv};
use stampede_scenarios::settings::{AuthArgs, RedisArgs};
use stampede_scenarios::thresholds::ThresholdChecker;
use std::time::Duration;

fn env(host: &str) -> ScenarioEnv {
    ScenarioEnv {
        client: Client::new(),
        host: host.to_string(),
        auth: AuthArgs {
            auth_api_key: Some(MOCK_API_KEY.to_string()),
            auth_base_uri: Some(host.to_string()),
            username: Some(MOCK_LOGIN_ID.to_string()),
            password: Some(MOCK_PASSWORD.to_string()),
        },
        redis: RedisArgs {
            memory_broker: true,
            ..Default::default()
        },
    }
}

async fn run(
    scenario: Scenario,
    env: &ScenarioEnv,
    users: usize,
    run_time: Duration,
) -> StatsSnapshot {
    let config = RunConfig::new(scenario.name(), &env.host)
        .users(users)
        .spawn_rate(20.)
        .run_time(run_time);
    scenario
        .register(Swarm::new(config), env)
        .unwrap()
        .run()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
#[timeout(20000)]
async fn line_items_against_mock() {
    let host = mock(MockConfig::default()).await;
    let snapshot = run(Scenario::LineItems, &env(&host), 4, Duration::from_secs(2)).await;

    let stats = snapshot.statistics();
    assert_eq!(stats.user_count, 4);
    assert!(stats.num_requests >= 4, "{stats:?}");
    assert_eq!(stats.num_failures, 0, "{:?}", snapshot.failures);
    assert!(snapshot.entry("POST", "LineItemRows").is_some());
}

#[tokio::test(flavor = "multi_thread")]
#[timeout(20000)]
async fn bad_credentials_leave_the_run_empty() {
    let host = mock(MockConfig::default()).await;
    let mut env = env(&host);
    env.auth.password = Some("wrong".to_string());

    let snapshot = run(Scenario::Messaging, &env, 2, Duration::from_secs(1)).await;
    assert_eq!(snapshot.statistics().num_requests, 0);
}

#[tokio::test(flavor = "multi_thread")]
#[timeout(20000)]
async fn storefront_scenarios_pass_validation() {
    let host = mock(MockConfig::default()).await;
    let env = env(&host);

    for scenario in [Scenario::Web, Scenario::Shoppers, Scenario::Journey, Scenario::Graphql] {
        let snapshot = run(scenario, &env, 4, Duration::from_millis(1500)).await;
        let stats = snapshot.statistics();
        assert!(stats.num_requests > 0, "{scenario}: {stats:?}");
        assert_eq!(stats.num_failures, 0, "{scenario}: {:?}", snapshot.failures);
    }
}

#[tokio::test(flavor = "multi_thread")]
#[timeout(20000)]
async fn pubsub_scenario_in_memory() {
    let host = mock(MockConfig::default()).await;
    let snapshot = run(Scenario::Redis, &env(&host), 6, Duration::from_secs(2)).await;

    let stats = snapshot.statistics();
    assert_eq!(stats.user_count, 6);
    assert_eq!(stats.num_failures, 0, "{:?}", snapshot.failures);
    assert!(snapshot
        .entries
        .iter()
        .any(|e| e.request_type == "Redis Pub"));
}

#[tokio::test(flavor = "multi_thread")]
#[timeout(20000)]
async fn stats_csv_gates_on_thresholds() {
    let host = mock(MockConfig {
        graphql_delay: Duration::from_millis(150),
        ..Default::default()
    })
    .await;
    let snapshot = run(Scenario::Graphql, &env(&host), 3, Duration::from_secs(2)).await;

    let dir = tempfile::tempdir().unwrap();
    let [stats_path, failures_path] =
        report::write_csv_files(&snapshot, &dir.path().join("results").join("stats")).unwrap();
    assert!(failures_path.exists());

    let breaches = ThresholdChecker::default().check_path(&stats_path).unwrap();
    assert!(breaches.is_empty(), "{breaches:?}");

    let strict =
        ThresholdChecker::new(vec![ThresholdRule::new(ThresholdMetric::AvgResponseTime, 100.)]);
    let breaches = strict.check_path(&stats_path).unwrap();
    assert!(!breaches.is_empty());
    assert!(breaches.iter().all(|b| b.name.starts_with("GraphQL: ")));
}
