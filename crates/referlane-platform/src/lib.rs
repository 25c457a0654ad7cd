pub mod config;
pub mod db;
pub mod notify;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use db::connect_database;
pub use notify::{
    NotificationSender, PaymentProcessedNotice, PendingPayoutNotice, RedisNotifier,
};
pub use redis_bus::RedisBus;
