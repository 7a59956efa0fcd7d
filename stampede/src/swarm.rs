//! The swarm runner.
use crate::events::{Events, Listener, TestStart};
use crate::stats::{RequestStats, StatsSnapshot};
use crate::user::{User, UserContext};
use futures_util::future::BoxFuture;
use governor::{Quota, RateLimiter};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use stampede_core::{ConfigError, RunConfig};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("No user classes registered")]
    NoUsers,

    #[error("User class {0} has a weight of zero")]
    ZeroWeight(&'static str),
}

type UserRunner =
    Arc<dyn Fn(UserContext, watch::Receiver<bool>) -> BoxFuture<'static, ()> + Send + Sync>;

struct UserClass {
    name: &'static str,
    weight: u32,
    runner: UserRunner,
}

/// A load-test run: user classes, listeners and the pacing to spawn them with.
///
/// # Example
/// ```ignore
/// let snapshot = Swarm::new(config)
///     .user(3, |_| BrowserUser::default())
///     .user(1, |_| BuyerUser::default())
///     .listener(reporter.clone())
///     .run()
///     .await?;
/// ```
pub struct Swarm {
    config: RunConfig,
    classes: Vec<UserClass>,
    listeners: Vec<Arc<dyn Listener>>,
    stats: Arc<RequestStats>,
}

impl Swarm {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            classes: vec![],
            listeners: vec![],
            stats: Arc::new(RequestStats::new()),
        }
    }

    /// Register a user class. `weight` sets its share of the spawned users;
    /// `factory` builds one fresh instance per spawned user.
    pub fn user<U, F>(mut self, weight: u32, factory: F) -> Self
    where
        U: User,
        F: Fn(&UserContext) -> U + Send + Sync + 'static,
    {
        let name = class_name::<U>();
        let runner: UserRunner = Arc::new(move |ctx: UserContext, stop| {
            let user = factory(&ctx);
            Box::pin(run_user(user, name, ctx, stop))
        });
        self.classes.push(UserClass {
            name,
            weight,
            runner,
        });
        self
    }

    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Live handle to this run's statistics.
    pub fn stats(&self) -> Arc<RequestStats> {
        self.stats.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[instrument(name = "swarm", skip_all, fields(name = %self.config.name))]
    pub async fn run(self) -> Result<StatsSnapshot, SwarmError> {
        self.config.validate()?;
        if self.classes.is_empty() {
            return Err(SwarmError::NoUsers);
        }
        if let Some(class) = self.classes.iter().find(|c| c.weight == 0) {
            return Err(SwarmError::ZeroWeight(class.name));
        }

        let Swarm {
            config,
            classes,
            listeners,
            stats,
        } = self;

        info!("Running {} with config {:?}", config.name, &config);

        let mut all = vec![stats.clone() as Arc<dyn Listener>];
        all.extend(listeners);
        let events = Events::new(all);

        let weights: Vec<u32> = classes.iter().map(|c| c.weight).collect();
        let plan = spawn_plan(&weights, config.users);
        let quota = Quota::with_period(config.spawn_interval()?)
            .ok_or(ConfigError::SpawnRate(config.spawn_rate))?
            .allow_burst(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(quota);

        let host: Arc<str> = Arc::from(config.host.as_str());
        let deadline = config.run_time.map(|d| Instant::now() + d);
        let (stop_tx, stop_rx) = watch::channel(false);

        events.test_start(&TestStart {
            name: config.name.clone(),
            host: config.host.clone(),
            target_user_count: config.users,
        });
        stats.reset_clock();

        let stop = stop_signal(deadline);
        tokio::pin!(stop);

        let logger = tokio::spawn(log_progress(stats.clone()).in_current_span());

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(plan.len());
        let mut interrupted = false;
        for (id, class_idx) in plan.iter().enumerate() {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    interrupted = true;
                    break;
                }
                _ = limiter.until_ready() => {}
            }

            let class = &classes[*class_idx];
            let ctx = UserContext::new(id, host.clone(), events.clone());
            trace!("Spawning user {id} ({})", class.name);
            handles.push(tokio::spawn(
                (class.runner)(ctx, stop_rx.clone()).in_current_span(),
            ));
        }

        if interrupted {
            warn!("Stopped while spawning, {} of {} users running", handles.len(), config.users);
        } else {
            info!("All {} users spawned", handles.len());
            events.spawning_complete(handles.len());
            stop.await;
        }
        stats.set_user_count(handles.len());

        info!("Stopping {} users", handles.len());
        let _ = stop_tx.send(true);
        for handle in handles {
            if let Err(err) = handle.await {
                error!("User task ended abnormally: {err}");
            }
        }
        logger.abort();

        let snapshot = stats.snapshot();
        events.test_stop(&snapshot.statistics());
        info!(
            "Run complete after {}",
            humantime::format_duration(Duration::from_secs(snapshot.elapsed.as_secs()))
        );

        Ok(snapshot)
    }
}

#[instrument(name = "user", skip_all, fields(id = ctx.id(), class = class))]
async fn run_user<U: User>(
    mut user: U,
    class: &'static str,
    ctx: UserContext,
    mut stop: watch::Receiver<bool>,
) {
    let started = tokio::select! {
        biased;
        _ = stopped(&mut stop) => return,
        res = user.on_start(&ctx) => res,
    };
    if let Err(err) = started {
        error!("User {} did not start: {err}", ctx.id());
        return;
    }

    let mut tasks = match user.tasks() {
        Ok(tasks) => tasks,
        Err(err) => {
            error!("User {} has an invalid task set: {err}", ctx.id());
            user.on_stop(&ctx).await;
            return;
        }
    };
    let wait = user.wait_time();
    let mut rng = SmallRng::from_entropy();
    debug!("User {} started", ctx.id());

    loop {
        let task = tasks.next_task(&mut rng);
        let pause = wait.sample(&mut rng);
        trace!("Running {task:?}");

        let step = async {
            user.execute(task, &ctx).await;
            tokio::time::sleep(pause).await;
        };

        tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            _ = step => {}
        }
    }

    user.on_stop(&ctx).await;
    debug!("User {} stopped", ctx.id());
}

/// Resolves once the stop flag is raised or the swarm is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn stop_signal(deadline: Option<Instant>) {
    let timer = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = timer => debug!("Run time elapsed"),
        _ = interrupt => info!("Interrupted"),
    }
}

async fn log_progress(stats: Arc<RequestStats>) {
    let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // NOTE: First tick completes instantly
    interval.tick().await;
    loop {
        interval.tick().await;
        let total = stats.snapshot().total;
        info!(
            "{} requests, {:.2}% failed, avg {:.0}ms, {:.2} req/s",
            total.num_requests,
            total.failure_percent(),
            total.avg_response_time,
            total.requests_per_second
        );
    }
}

/// Assigns each of `users` spawn slots to a class index, proportionally to
/// `weights` (largest remainder), interleaving classes in spawn order.
pub(crate) fn spawn_plan(weights: &[u32], users: usize) -> Vec<usize> {
    let total: u64 = weights.iter().map(|w| *w as u64).sum();
    if total == 0 || users == 0 {
        return vec![];
    }

    let mut counts: Vec<usize> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(weights.len());
    for (idx, w) in weights.iter().enumerate() {
        let share = users as u64 * *w as u64;
        counts.push((share / total) as usize);
        remainders.push((share % total, idx));
    }

    let assigned: usize = counts.iter().sum();
    // Largest remainder first, lower index on ties.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.iter().take(users - assigned) {
        counts[*idx] += 1;
    }

    let mut plan = Vec::with_capacity(users);
    while plan.len() < users {
        for (idx, count) in counts.iter_mut().enumerate() {
            if *count > 0 {
                *count -= 1;
                plan.push(idx);
            }
        }
    }
    plan
}

fn class_name<U>() -> &'static str {
    let full = std::any::type_name::<U>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskSet, TaskSetError};
    use crate::user::UserError;
    use crate::wait::WaitTime;
    use stampede_core::RequestEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn plan_is_proportional() {
        let plan = spawn_plan(&[3, 1], 8);
        assert_eq!(plan.iter().filter(|c| **c == 0).count(), 6);
        assert_eq!(plan.iter().filter(|c| **c == 1).count(), 2);
        assert_eq!(&plan[..2], &[0, 1]);
    }

    #[test]
    fn plan_hands_out_remainders() {
        let plan = spawn_plan(&[1, 1, 1], 4);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.iter().filter(|c| **c == 0).count(), 2);
    }

    #[test]
    fn plan_with_fewer_users_than_classes() {
        let plan = spawn_plan(&[1, 10], 1);
        assert_eq!(plan, vec![1]);
    }

    #[derive(Copy, Clone, Debug)]
    enum Task {
        Ping,
    }

    struct Pinger {
        stopped: Arc<AtomicUsize>,
    }

    impl User for Pinger {
        type Task = Task;

        fn tasks(&self) -> Result<TaskSet<Task>, TaskSetError> {
            TaskSet::weighted([(Task::Ping, 1)])
        }

        fn wait_time(&self) -> WaitTime {
            WaitTime::Constant(Duration::from_millis(20))
        }

        async fn execute(&mut self, _task: Task, ctx: &UserContext) {
            ctx.fire(RequestEvent::success("PING", "ping", Duration::from_millis(1), 4));
        }

        async fn on_stop(&mut self, _ctx: &UserContext) {
            self.stopped.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct Broken;

    impl User for Broken {
        type Task = Task;

        fn tasks(&self) -> Result<TaskSet<Task>, TaskSetError> {
            Ok(TaskSet::single(Task::Ping))
        }

        fn wait_time(&self) -> WaitTime {
            WaitTime::None
        }

        async fn on_start(&mut self, _ctx: &UserContext) -> Result<(), UserError> {
            Err(UserError::start("no token"))
        }

        async fn execute(&mut self, _task: Task, _ctx: &UserContext) {
            unreachable!("a user that failed to start never runs tasks")
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn failed_start_does_not_stop_the_run() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let counter = stopped.clone();
        let config = RunConfig::new("mixed", "http://localhost")
            .users(4)
            .spawn_rate(100.)
            .run_time(Duration::from_millis(500));

        let snapshot = Swarm::new(config)
            .user(1, move |_| Pinger {
                stopped: counter.clone(),
            })
            .user(1, |_| Broken)
            .run()
            .await
            .unwrap();

        assert_eq!(snapshot.user_count, 4);
        assert_eq!(stopped.load(Ordering::Relaxed), 2);
        let ping = snapshot.entry("PING", "ping").unwrap();
        assert!(ping.num_requests >= 10, "only {} pings", ping.num_requests);
        assert_eq!(ping.num_failures, 0);
        assert!(logs_contain("did not start"));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn listeners_see_lifecycle() {
        #[derive(Default)]
        struct Recorder {
            started: AtomicUsize,
            spawned: AtomicUsize,
            requests: AtomicUsize,
            stopped: AtomicUsize,
        }

        impl Listener for Recorder {
            fn on_test_start(&self, start: &TestStart) {
                self.started.store(start.target_user_count, Ordering::Relaxed);
            }
            fn on_request(&self, _event: &RequestEvent) {
                self.requests.fetch_add(1, Ordering::Relaxed);
            }
            fn on_spawning_complete(&self, user_count: usize) {
                self.spawned.store(user_count, Ordering::Relaxed);
            }
            fn on_test_stop(&self, stats: &stampede_core::RunStatistics) {
                self.stopped.store(stats.num_requests as usize, Ordering::Relaxed);
            }
        }

        let recorder = Arc::new(Recorder::default());
        let config = RunConfig::new("lifecycle", "http://localhost")
            .users(3)
            .spawn_rate(50.)
            .run_time(Duration::from_millis(300));

        let snapshot = Swarm::new(config)
            .user(1, |_| Pinger {
                stopped: Arc::new(AtomicUsize::new(0)),
            })
            .listener(recorder.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(recorder.started.load(Ordering::Relaxed), 3);
        assert_eq!(recorder.spawned.load(Ordering::Relaxed), 3);
        let requests = recorder.requests.load(Ordering::Relaxed);
        assert!(requests > 0);
        assert_eq!(requests as u64, snapshot.total.num_requests);
        assert_eq!(recorder.stopped.load(Ordering::Relaxed), requests);
    }

    #[tokio::test]
    async fn rejects_empty_swarm() {
        let config = RunConfig::new("empty", "http://localhost").run_time(Duration::from_secs(1));
        assert!(matches!(Swarm::new(config).run().await, Err(SwarmError::NoUsers)));
    }

    #[tokio::test]
    async fn rejects_zero_weight_class() {
        let config = RunConfig::new("zero", "http://localhost").run_time(Duration::from_secs(1));
        let res = Swarm::new(config).user(0, |_| Broken).run().await;
        assert!(matches!(res, Err(SwarmError::ZeroWeight("Broken"))));
    }

    #[tokio::test]
    async fn rejects_vanishing_spawn_rate() {
        let config = RunConfig::new("slow", "http://localhost")
            .spawn_rate(1e-30)
            .run_time(Duration::from_secs(1));
        let res = Swarm::new(config).user(1, |_| Broken).run().await;
        assert!(matches!(res, Err(SwarmError::Config(ConfigError::SpawnRate(_)))));
    }
}
