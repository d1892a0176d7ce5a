//! Client for the remote show catalog: config, wire payloads, retry policy.

pub mod client;
pub mod config;
pub mod dto;
pub mod retry;

pub use client::{CatalogClient, CatalogError};
pub use config::CatalogConfig;
pub use retry::RetryPolicy;
