mod utils;
#[allow(unused)]
use utils::*;

/// Needs a Redis server at `REDIS_URL` (default localhost:6379).
#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use ntest::timeout;
    use stampede::prelude::*;
    use stampede_scenarios::pubsub::{
        Broker, Publisher, RedisBroker, Subscriber, DEFAULT_REDIS_URL,
    };
    use stampede_scenarios::users::{HybridRedisUser, RedisPublisherUser, RedisSubscriberUser};
    use std::time::Duration;

    fn broker() -> RedisBroker {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        RedisBroker::open(&url).unwrap()
    }

    #[tokio::test]
    #[timeout(10000)]
    async fn publish_reaches_subscriber() {
        init();
        let broker = broker();
        let mut sub = broker.subscribe(&["stampede:test"]).await.unwrap();
        let mut publisher = broker.publisher().await.unwrap();

        let receivers = publisher.publish("stampede:test", "{\"n\":1}").await.unwrap();
        assert_eq!(receivers, 1);

        let msg = sub.next_message(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(msg.channel, "stampede:test");
        assert_eq!(msg.payload, "{\"n\":1}");

        assert_eq!(sub.next_message(Duration::from_millis(100)).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[timeout(20000)]
    async fn redis_swarm() {
        init();
        let config = RunConfig::new("redis", "redis://localhost")
            .users(6)
            .spawn_rate(20.)
            .run_time(Duration::from_secs(3));
        let (a, b, c) = (broker(), broker(), broker());

        let snapshot = Swarm::new(config)
            .user(1, move |_| RedisPublisherUser::new(a.clone()))
            .user(1, move |_| RedisSubscriberUser::new(b.clone()))
            .user(1, move |_| HybridRedisUser::new(c.clone()))
            .run()
            .await
            .unwrap();

        let stats = snapshot.statistics();
        assert!(stats.num_requests > 0);
        assert_eq!(stats.num_failures, 0, "{:?}", snapshot.failures);
    }
}
