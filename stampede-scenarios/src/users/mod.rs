//! Simulated users, one module per traffic shape.
//!
//! GraphQL users authenticate against the identity service in `on_start`
//! and carry the token as a cookie. Web users talk to the storefront's REST
//! endpoints. Redis users open their own pub/sub connections.
pub mod line_items;
pub mod messaging;
pub mod redis;
pub mod shop;
pub mod web;

pub use self::line_items::LineItemsUser;
pub use self::messaging::MessagingUser;
pub use self::redis::{HybridRedisUser, RedisPublisherUser, RedisSubscriberUser};
pub use self::shop::GraphQlShopUser;
pub use self::web::{BrowserUser, BuyerUser, JourneyUser, RealisticWebUser};
