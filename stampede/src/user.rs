use crate::events::Events;
use crate::task::{TaskSet, TaskSetError};
use crate::wait::WaitTime;
use stampede_core::RequestEvent;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User failed to start: {0}")]
    Start(#[source] Box<dyn Error + Send + Sync>),

    #[error("Invalid task set: {0}")]
    TaskSet(#[from] TaskSetError),
}

impl UserError {
    pub fn start(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        UserError::Start(err.into())
    }
}

/// A simulated user.
///
/// One instance lives on one tokio task for the length of the run. Task
/// execution within a user is strictly sequential.
pub trait User: Send + Sized + 'static {
    type Task: Copy + fmt::Debug + Send + Sync + 'static;

    /// Called once after `on_start` succeeds.
    fn tasks(&self) -> Result<TaskSet<Self::Task>, TaskSetError>;

    fn wait_time(&self) -> WaitTime;

    /// Setup such as authentication or opening connections. An error here
    /// retires this user without affecting the rest of the swarm.
    fn on_start(
        &mut self,
        _ctx: &UserContext,
    ) -> impl Future<Output = Result<(), UserError>> + Send {
        async { Ok::<_, UserError>(()) }
    }

    fn execute(&mut self, task: Self::Task, ctx: &UserContext) -> impl Future<Output = ()> + Send;

    fn on_stop(&mut self, _ctx: &UserContext) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Per-user handle to the run: identity, target host and the event fan-out.
#[derive(Clone)]
pub struct UserContext {
    id: usize,
    host: Arc<str>,
    events: Events,
    spawned: Instant,
}

impl UserContext {
    pub fn new(id: usize, host: Arc<str>, events: Events) -> Self {
        Self {
            id,
            host,
            events,
            spawned: Instant::now(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Joins `path` onto the run's host.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.host, path)
        } else {
            format!("{}/{}", self.host, path)
        }
    }

    pub fn fire(&self, event: RequestEvent) {
        self.events.request(&event);
    }

    /// Time since this user was spawned.
    pub fn lifetime(&self) -> Duration {
        self.spawned.elapsed()
    }
}

impl fmt::Debug for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserContext")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("listeners", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining() {
        let ctx = UserContext::new(0, Arc::from("http://localhost:3000"), Events::default());
        assert_eq!(ctx.url("/graphql"), "http://localhost:3000/graphql");
        assert_eq!(ctx.url("api/search?q=phone"), "http://localhost:3000/api/search?q=phone");
    }
}
