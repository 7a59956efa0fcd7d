use crate::graphql::GraphQlClient;
use crate::pubsub::{Broker, MemoryBroker, RedisBroker};
use crate::settings::{AuthArgs, RedisArgs, SettingsError};
use crate::users::{
    BrowserUser, BuyerUser, GraphQlShopUser, HybridRedisUser, JourneyUser, LineItemsUser,
    MessagingUser, RealisticWebUser, RedisPublisherUser, RedisSubscriberUser,
};
use clap::ValueEnum;
use reqwest::Client;
use stampede::Swarm;
use std::fmt;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    LineItems,
    Messaging,
    Web,
    Shoppers,
    Journey,
    Graphql,
    RedisPub,
    RedisSub,
    RedisHybrid,
    Redis,
}

/// Everything a scenario may need to build its users.
pub struct ScenarioEnv {
    pub client: Client,
    pub host: String,
    pub auth: AuthArgs,
    pub redis: RedisArgs,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::LineItems => "line-items",
            Scenario::Messaging => "messaging",
            Scenario::Web => "web",
            Scenario::Shoppers => "shoppers",
            Scenario::Journey => "journey",
            Scenario::Graphql => "graphql",
            Scenario::RedisPub => "redis-pub",
            Scenario::RedisSub => "redis-sub",
            Scenario::RedisHybrid => "redis-hybrid",
            Scenario::Redis => "redis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::LineItems => "Authenticated LineItemRows queries against the GraphQL API",
            Scenario::Messaging => "Authenticated AddMessageToConversations mutations",
            Scenario::Web => "Homepage, search, product pages, a GraphQL profile and the cart",
            Scenario::Shoppers => "A mix of browsing and buying storefront users",
            Scenario::Journey => "One fixed path: homepage, search, product, add to cart",
            Scenario::Graphql => "Profile, product and cart operations with response validation",
            Scenario::RedisPub => "Publishes notifications and system events",
            Scenario::RedisSub => "Subscribes to notifications and measures delivery latency",
            Scenario::RedisHybrid => "Publishes and reads chat messages on one connection pair",
            Scenario::Redis => "Publishers, subscribers and hybrid users together",
        }
    }

    pub fn all() -> &'static [Scenario] {
        Self::value_variants()
    }

    /// Whether users log in through the identity service on start.
    pub fn needs_login(&self) -> bool {
        matches!(self, Scenario::LineItems | Scenario::Messaging)
    }

    pub fn uses_pubsub(&self) -> bool {
        matches!(
            self,
            Scenario::RedisPub | Scenario::RedisSub | Scenario::RedisHybrid | Scenario::Redis
        )
    }

    /// Register this scenario's user classes on `swarm`.
    pub fn register(&self, swarm: Swarm, env: &ScenarioEnv) -> Result<Swarm, SettingsError> {
        let client = env.client.clone();
        let graphql = GraphQlClient::new(client.clone(), &env.host);

        let swarm = match self {
            Scenario::LineItems => {
                let login = env.auth.login(client)?;
                swarm.user(1, move |_| LineItemsUser::new(graphql.clone(), login.clone()))
            }
            Scenario::Messaging => {
                let login = env.auth.login(client)?;
                swarm.user(1, move |_| MessagingUser::new(graphql.clone(), login.clone()))
            }
            Scenario::Web => {
                swarm.user(1, move |_| RealisticWebUser::new(client.clone(), graphql.clone()))
            }
            Scenario::Shoppers => {
                let buyer_client = client.clone();
                swarm
                    .user(1, move |_| BrowserUser::new(client.clone()))
                    .user(1, move |_| BuyerUser::new(buyer_client.clone()))
            }
            Scenario::Journey => swarm.user(1, move |_| JourneyUser::new(client.clone())),
            Scenario::Graphql => swarm.user(1, move |_| GraphQlShopUser::new(graphql.clone())),
            _ if env.redis.memory_broker => {
                info!("Using the in-process broker");
                self.register_pubsub(swarm, MemoryBroker::new())
            }
            _ => {
                info!("Using Redis at {}", env.redis.redis_url);
                self.register_pubsub(swarm, RedisBroker::open(&env.redis.redis_url)?)
            }
        };
        Ok(swarm)
    }

    fn register_pubsub<B: Broker>(&self, swarm: Swarm, broker: B) -> Swarm {
        let publisher = broker.clone();
        let subscriber = broker.clone();
        match self {
            Scenario::RedisPub => {
                swarm.user(1, move |_| RedisPublisherUser::new(publisher.clone()))
            }
            Scenario::RedisSub => {
                swarm.user(1, move |_| RedisSubscriberUser::new(subscriber.clone()))
            }
            Scenario::RedisHybrid => swarm.user(1, move |_| HybridRedisUser::new(broker.clone())),
            _ => swarm
                .user(1, move |_| RedisPublisherUser::new(publisher.clone()))
                .user(1, move |_| RedisSubscriberUser::new(subscriber.clone()))
                .user(1, move |_| HybridRedisUser::new(broker.clone())),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::RunConfig;

    fn env() -> ScenarioEnv {
        ScenarioEnv {
            client: Client::new(),
            host: "http://localhost:3000".to_string(),
            auth: AuthArgs::default(),
            redis: RedisArgs {
                memory_broker: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn names_match_cli_values() {
        for scenario in Scenario::all() {
            let parsed = Scenario::from_str(scenario.name(), false).unwrap();
            assert_eq!(parsed, *scenario);
        }
        assert_eq!(Scenario::all().len(), 10);
    }

    #[test]
    fn login_scenarios_need_credentials() {
        let swarm = Swarm::new(RunConfig::new("t", "http://localhost:3000"));
        let res = Scenario::LineItems.register(swarm, &env());
        assert!(matches!(res, Err(SettingsError::Missing(_))));
    }

    #[test]
    fn anonymous_scenarios_register() {
        for scenario in Scenario::all().iter().filter(|s| !s.needs_login()) {
            let swarm = Swarm::new(RunConfig::new("t", "http://localhost:3000"));
            assert!(scenario.register(swarm, &env()).is_ok(), "{scenario}");
        }
    }
}
