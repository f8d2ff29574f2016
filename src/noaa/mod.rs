pub mod audit;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod daemon_lock;
pub mod enhancement;
pub mod forecast;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod schedule;
pub mod store;
pub mod thumbnail;
pub mod util;
pub mod warn;
pub mod watcher;
