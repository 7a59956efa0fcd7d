//! Pub/sub users. Each opens its own connections in `on_start` and drops
//! them in `on_stop`; a user without a connection reports every task as a
//! failure.
use crate::pubsub::{Broker, Message, PubSubError, Publisher, Subscriber};
use serde_json::{json, Value};
use stampede::prelude::*;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const NOTIFICATION_CHANNEL: &str = "notifications:user:123";
pub const SYSTEM_CHANNEL: &str = "system:events";
pub const CHAT_CHANNEL: &str = "chat:room:1";

pub const SUBSCRIBER_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const CHAT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

const PUB: &str = "Redis Pub";
const SUB: &str = "Redis Sub";
const CHAT: &str = "Redis Pub/Sub";

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Milliseconds between the payload's `timestamp` and now, 0 when the payload
/// carries no usable timestamp.
pub fn delivery_latency_ms(payload: &str) -> f64 {
    let sent = serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| v.get("timestamp").and_then(Value::as_str).map(str::to_string))
        .and_then(|ts| OffsetDateTime::parse(&ts, &Rfc3339).ok());
    match sent {
        Some(sent) => (OffsetDateTime::now_utc() - sent).as_seconds_f64() * 1000.,
        None => 0.,
    }
}

pub fn user_notification() -> String {
    json!({
        "type": "new_message",
        "userId": "user123",
        "message": "You have a new message",
        "timestamp": timestamp(),
    })
    .to_string()
}

pub fn system_event() -> String {
    json!({
        "type": "deployment",
        "service": "api-server",
        "version": "1.2.3",
        "timestamp": timestamp(),
    })
    .to_string()
}

pub fn chat_message() -> String {
    json!({
        "user": "user123",
        "text": "Hello, world!",
        "timestamp": timestamp(),
    })
    .to_string()
}

/// Publish one payload and report it. Returns the receiver count on success.
async fn publish<P: Publisher>(
    publisher: Option<&mut P>,
    ctx: &UserContext,
    request_type: &str,
    name: &str,
    channel: &str,
    payload: &str,
) -> Option<usize> {
    let start = Instant::now();
    let res = match publisher {
        Some(publisher) => publisher.publish(channel, payload).await,
        None => Err(PubSubError::NotConnected),
    };
    let elapsed = start.elapsed();

    match res {
        Ok(receivers) => {
            ctx.fire(RequestEvent::success(request_type, name, elapsed, payload.len()));
            Some(receivers)
        }
        Err(err) => {
            debug!("Redis publish error: {err}");
            ctx.fire(RequestEvent::failure(request_type, name, elapsed, err.to_string()));
            None
        }
    }
}

/// Poll once. Idle polls are not reported.
async fn receive<S: Subscriber>(
    subscriber: Option<&mut S>,
    timeout: Duration,
) -> (Result<Option<Message>, PubSubError>, Duration) {
    let start = Instant::now();
    let res = match subscriber {
        Some(subscriber) => subscriber.next_message(timeout).await,
        None => Err(PubSubError::NotConnected),
    };
    (res, start.elapsed())
}

/* Publisher */

#[derive(Copy, Clone, Debug)]
pub enum PublishTask {
    UserNotification,
    SystemEvent,
}

pub struct RedisPublisherUser<B: Broker> {
    broker: B,
    publisher: Option<B::Publisher>,
}

impl<B: Broker> RedisPublisherUser<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            publisher: None,
        }
    }
}

impl<B: Broker> User for RedisPublisherUser<B> {
    type Task = PublishTask;

    fn tasks(&self) -> Result<TaskSet<PublishTask>, TaskSetError> {
        TaskSet::weighted([(PublishTask::UserNotification, 3), (PublishTask::SystemEvent, 2)])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 5.)
    }

    async fn on_start(&mut self, ctx: &UserContext) -> Result<(), UserError> {
        match self.broker.publisher().await {
            Ok(publisher) => {
                debug!("Publisher {}: connected", ctx.id());
                self.publisher = Some(publisher);
            }
            Err(err) => error!("Publisher {}: failed to connect: {err}", ctx.id()),
        }
        Ok(())
    }

    async fn execute(&mut self, task: PublishTask, ctx: &UserContext) {
        let (name, channel, payload) = match task {
            PublishTask::UserNotification => {
                ("Publish User Notification", NOTIFICATION_CHANNEL, user_notification())
            }
            PublishTask::SystemEvent => ("Publish System Event", SYSTEM_CHANNEL, system_event()),
        };

        let receivers = publish(self.publisher.as_mut(), ctx, PUB, name, channel, &payload).await;
        if receivers == Some(0) {
            warn!("No subscribers for channel {channel}");
        }
    }

    async fn on_stop(&mut self, ctx: &UserContext) {
        if self.publisher.take().is_some() {
            debug!("Publisher {}: closed connection", ctx.id());
        }
    }
}

/* Subscriber */

#[derive(Copy, Clone, Debug)]
pub enum SubscribeTask {
    Listen,
}

pub struct RedisSubscriberUser<B: Broker> {
    broker: B,
    subscriber: Option<B::Subscriber>,
    received: u64,
    total_latency_ms: f64,
}

impl<B: Broker> RedisSubscriberUser<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            subscriber: None,
            received: 0,
            total_latency_ms: 0.,
        }
    }
}

impl<B: Broker> User for RedisSubscriberUser<B> {
    type Task = SubscribeTask;

    fn tasks(&self) -> Result<TaskSet<SubscribeTask>, TaskSetError> {
        Ok(TaskSet::single(SubscribeTask::Listen))
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(0.1, 0.5)
    }

    async fn on_start(&mut self, ctx: &UserContext) -> Result<(), UserError> {
        match self.broker.subscribe(&[NOTIFICATION_CHANNEL, SYSTEM_CHANNEL]).await {
            Ok(subscriber) => {
                debug!("Subscriber {}: subscribed", ctx.id());
                self.subscriber = Some(subscriber);
            }
            Err(err) => error!("Subscriber {}: failed to subscribe: {err}", ctx.id()),
        }
        Ok(())
    }

    async fn execute(&mut self, _task: SubscribeTask, ctx: &UserContext) {
        let (res, elapsed) = receive(self.subscriber.as_mut(), SUBSCRIBER_POLL_TIMEOUT).await;
        match res {
            Ok(Some(msg)) => {
                let latency = delivery_latency_ms(&msg.payload);
                self.received += 1;
                self.total_latency_ms += latency;
                let name = format!("Receive from {}", msg.channel);
                ctx.fire(
                    RequestEvent::success(SUB, &name, elapsed, msg.payload.len())
                        .with_context("latency_ms", latency),
                );
            }
            Ok(None) => trace!("No message within {SUBSCRIBER_POLL_TIMEOUT:?}"),
            Err(err) => {
                debug!("Redis receive error: {err}");
                ctx.fire(RequestEvent::failure(SUB, "Receive Message", elapsed, err.to_string()));
            }
        }
    }

    async fn on_stop(&mut self, ctx: &UserContext) {
        self.subscriber = None;
        if self.received > 0 {
            info!(
                "Subscriber {}: received {} messages, avg latency: {:.2}ms",
                ctx.id(),
                self.received,
                self.total_latency_ms / self.received as f64
            );
        }
    }
}

/* Hybrid */

#[derive(Copy, Clone, Debug)]
pub enum ChatTask {
    Send,
    Receive,
}

/// Both ends of a chat room.
pub struct HybridRedisUser<B: Broker> {
    broker: B,
    publisher: Option<B::Publisher>,
    subscriber: Option<B::Subscriber>,
}

impl<B: Broker> HybridRedisUser<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            publisher: None,
            subscriber: None,
        }
    }
}

impl<B: Broker> User for HybridRedisUser<B> {
    type Task = ChatTask;

    fn tasks(&self) -> Result<TaskSet<ChatTask>, TaskSetError> {
        TaskSet::weighted([(ChatTask::Send, 2), (ChatTask::Receive, 1)])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 3.)
    }

    async fn on_start(&mut self, ctx: &UserContext) -> Result<(), UserError> {
        match self.broker.publisher().await {
            Ok(publisher) => self.publisher = Some(publisher),
            Err(err) => error!("Chat user {}: failed to connect: {err}", ctx.id()),
        }
        match self.broker.subscribe(&[CHAT_CHANNEL]).await {
            Ok(subscriber) => self.subscriber = Some(subscriber),
            Err(err) => error!("Chat user {}: failed to subscribe: {err}", ctx.id()),
        }
        Ok(())
    }

    async fn execute(&mut self, task: ChatTask, ctx: &UserContext) {
        match task {
            ChatTask::Send => {
                let payload = chat_message();
                publish(
                    self.publisher.as_mut(),
                    ctx,
                    CHAT,
                    "Send Chat Message",
                    CHAT_CHANNEL,
                    &payload,
                )
                .await;
            }
            ChatTask::Receive => {
                let (res, elapsed) = receive(self.subscriber.as_mut(), CHAT_POLL_TIMEOUT).await;
                match res {
                    Ok(Some(msg)) => ctx.fire(RequestEvent::success(
                        CHAT,
                        "Receive Chat Message",
                        elapsed,
                        msg.payload.len(),
                    )),
                    Ok(None) => {}
                    Err(err) => ctx.fire(RequestEvent::failure(
                        CHAT,
                        "Receive Chat Message",
                        elapsed,
                        err.to_string(),
                    )),
                }
            }
        }
    }

    async fn on_stop(&mut self, _ctx: &UserContext) {
        self.subscriber = None;
        self.publisher = None;
    }
}
