//! Run lifecycle and request notifications.
use stampede_core::{RequestEvent, RunStatistics};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct TestStart {
    pub name: String,
    pub host: String,
    pub target_user_count: usize,
}

/// Observer of a swarm run.
///
/// Callbacks run inline on the user task that produced them, so they must
/// not block. Anything slow belongs on a queue drained elsewhere.
pub trait Listener: Send + Sync {
    fn on_test_start(&self, _start: &TestStart) {}

    fn on_request(&self, _event: &RequestEvent) {}

    fn on_spawning_complete(&self, _user_count: usize) {}

    fn on_test_stop(&self, _stats: &RunStatistics) {}
}

/// The registered listeners of one run, cheap to clone into every user.
#[derive(Clone, Default)]
pub struct Events {
    listeners: Arc<Vec<Arc<dyn Listener>>>,
}

impl Events {
    pub fn new(listeners: Vec<Arc<dyn Listener>>) -> Self {
        Self {
            listeners: Arc::new(listeners),
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn test_start(&self, start: &TestStart) {
        for listener in self.listeners.iter() {
            listener.on_test_start(start);
        }
    }

    pub fn request(&self, event: &RequestEvent) {
        for listener in self.listeners.iter() {
            listener.on_request(event);
        }
    }

    pub fn spawning_complete(&self, user_count: usize) {
        for listener in self.listeners.iter() {
            listener.on_spawning_complete(user_count);
        }
    }

    pub fn test_stop(&self, stats: &RunStatistics) {
        for listener in self.listeners.iter() {
            listener.on_test_stop(stats);
        }
    }
}

/// Adapts a closure into a request-only [`Listener`].
pub struct OnRequest<F>(pub F);

impl<F> Listener for OnRequest<F>
where
    F: Fn(&RequestEvent) + Send + Sync,
{
    fn on_request(&self, event: &RequestEvent) {
        (self.0)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn fans_out_to_every_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = |hits: Arc<AtomicUsize>| -> Arc<dyn Listener> {
            Arc::new(OnRequest(move |_: &RequestEvent| {
                hits.fetch_add(1, Ordering::Relaxed);
            }))
        };
        let events = Events::new(vec![listener(hits.clone()), listener(hits.clone())]);

        events.request(&RequestEvent::success("GET", "/", Duration::from_millis(3), 10));
        events.spawning_complete(4);

        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }
}
