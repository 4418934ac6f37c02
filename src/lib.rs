pub mod config;
pub mod domain;
pub mod metrics;
pub mod notifications;
pub mod service;
pub mod store;
pub mod utils;
