//! Publish/subscribe backends.
//!
//! [`RedisBroker`] talks to a real server; [`MemoryBroker`] fans messages out
//! in-process and backs the tests and the `--memory-broker` dry runs.
use futures_util::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Subscription closed")]
    Closed,

    #[error("No connection")]
    NotConnected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub channel: String,
    pub payload: String,
}

/// A source of publisher and subscriber connections. Every call opens a new
/// connection owned by the caller.
pub trait Broker: Clone + Send + Sync + 'static {
    type Publisher: Publisher;
    type Subscriber: Subscriber;

    fn publisher(&self) -> impl Future<Output = Result<Self::Publisher, PubSubError>> + Send;

    fn subscribe(
        &self,
        channels: &[&str],
    ) -> impl Future<Output = Result<Self::Subscriber, PubSubError>> + Send;
}

pub trait Publisher: Send + 'static {
    /// Returns how many subscribers received the message.
    fn publish(
        &mut self,
        channel: &str,
        payload: &str,
    ) -> impl Future<Output = Result<usize, PubSubError>> + Send;
}

pub trait Subscriber: Send + 'static {
    /// Waits up to `timeout` for the next message. `Ok(None)` when nothing
    /// arrived in time.
    fn next_message(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Message>, PubSubError>> + Send;
}

/* Redis */

#[derive(Clone, Debug)]
pub struct RedisBroker {
    client: redis::Client,
}

impl RedisBroker {
    pub fn open(url: &str) -> Result<Self, PubSubError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

pub struct RedisPublisher {
    conn: redis::aio::MultiplexedConnection,
}

pub struct RedisSubscriber {
    messages: BoxStream<'static, redis::Msg>,
}

impl Broker for RedisBroker {
    type Publisher = RedisPublisher;
    type Subscriber = RedisSubscriber;

    async fn publisher(&self) -> Result<RedisPublisher, PubSubError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(RedisPublisher { conn })
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<RedisSubscriber, PubSubError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(*channel).await?;
        }
        Ok(RedisSubscriber {
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

impl Publisher for RedisPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize, PubSubError> {
        let receivers: usize = self.conn.publish(channel, payload).await?;
        Ok(receivers)
    }
}

impl Subscriber for RedisSubscriber {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, PubSubError> {
        match tokio::time::timeout(timeout, self.messages.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(PubSubError::Closed),
            Ok(Some(msg)) => Ok(Some(Message {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload()?,
            })),
        }
    }
}

/* In-memory */

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<Message>>>;

#[derive(Clone, Default)]
pub struct MemoryBroker {
    channels: Arc<Mutex<Subscribers>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn deliver(&self, channel: &str, payload: &str) -> usize {
        let mut channels = self.lock();
        let Some(subscribers) = channels.get_mut(channel) else {
            return 0;
        };
        let message = Message {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        subscribers.len()
    }
}

pub struct MemoryPublisher {
    broker: MemoryBroker,
}

pub struct MemorySubscriber {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Broker for MemoryBroker {
    type Publisher = MemoryPublisher;
    type Subscriber = MemorySubscriber;

    async fn publisher(&self) -> Result<MemoryPublisher, PubSubError> {
        Ok(MemoryPublisher {
            broker: self.clone(),
        })
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<MemorySubscriber, PubSubError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        for channel in channels {
            subscribers
                .entry(channel.to_string())
                .or_default()
                .push(tx.clone());
        }
        Ok(MemorySubscriber { rx })
    }
}

impl Publisher for MemoryPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize, PubSubError> {
        Ok(self.broker.deliver(channel, payload))
    }
}

impl Subscriber for MemorySubscriber {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, PubSubError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(PubSubError::Closed),
            Ok(Some(msg)) => Ok(Some(msg)),
        }
    }
}
