//! Asbis (it4profit) product and price feeds.
pub mod client;
pub mod config;
pub mod models;

pub use client::AsbisClient;
pub use config::AsbisConfig;
