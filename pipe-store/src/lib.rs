pub mod config;
pub mod db;
pub mod error;
pub mod repository;
pub mod service;
pub mod store;
pub mod watch;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Result, StoreError};
pub use store::Store;
pub use watch::{PublishReport, SubscriberId, WatchBus, Watcher};
