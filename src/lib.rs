pub mod api;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod utils;
pub mod validation;
