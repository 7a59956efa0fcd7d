//! User-swarm load generation.
//!
//! A [`Swarm`] spawns simulated users at a fixed rate. Each user runs its
//! `on_start` hook, then repeatedly picks a task from its [`TaskSet`], runs
//! it, and sleeps for its [`WaitTime`]. Tasks report their work as
//! [`RequestEvent`](stampede_core::RequestEvent)s, which are aggregated into
//! the run statistics and fanned out to every registered [`Listener`].
//!
//! # Example
//! ```no_run
//! use stampede::prelude::*;
//! use std::time::{Duration, Instant};
//!
//! struct Pinger;
//!
//! #[derive(Copy, Clone, Debug)]
//! enum Task {
//!     Ping,
//! }
//!
//! impl User for Pinger {
//!     type Task = Task;
//!
//!     fn tasks(&self) -> Result<TaskSet<Task>, TaskSetError> {
//!         TaskSet::weighted([(Task::Ping, 1)])
//!     }
//!
//!     fn wait_time(&self) -> WaitTime {
//!         WaitTime::between_secs(1., 3.)
//!     }
//!
//!     async fn execute(&mut self, _task: Task, ctx: &UserContext) {
//!         let start = Instant::now();
//!         ctx.fire(RequestEvent::success("PING", "ping", start.elapsed(), 0));
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SwarmError> {
//!     let config = RunConfig::new("ping", "http://localhost:3000")
//!         .users(10)
//!         .spawn_rate(2.)
//!         .run_time(Duration::from_secs(60));
//!     let snapshot = Swarm::new(config).user(1, |_| Pinger).run().await?;
//!     println!("{}", stampede::report::summary_table(&snapshot));
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod report;
pub mod stats;
pub mod swarm;
pub mod task;
pub mod user;
pub mod wait;

pub use events::{Events, Listener};
pub use stats::{RequestStats, StatsSnapshot};
pub use swarm::{Swarm, SwarmError};
pub use task::{TaskSet, TaskSetError};
pub use user::{User, UserContext, UserError};
pub use wait::WaitTime;

pub mod prelude {
    pub use crate::events::{Listener, TestStart};
    pub use crate::swarm::{Swarm, SwarmError};
    pub use crate::task::{TaskSet, TaskSetError};
    pub use crate::user::{User, UserContext, UserError};
    pub use crate::wait::WaitTime;

    pub use stampede_core::{RequestEvent, RunConfig, RunStatistics};
}
