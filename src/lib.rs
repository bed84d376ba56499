//! Quota-gated notification dispatch.
//!
//! A [`DispatchCoordinator`](dispatch::DispatchCoordinator) checks the monthly
//! send quota, fans a message out concurrently to every recipient through the
//! [`ChannelRegistry`](channels::ChannelRegistry) and records the observed
//! counts in versioned per-day counter documents. Channel configurations are
//! kept in the same versioned store through [`ConfigStore`](config_store::ConfigStore).

pub mod channels;
pub mod clock;
pub mod config;
pub mod config_store;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod models;
pub mod quota;
pub mod settings;
pub mod state;

pub use error::{AppError, Result};
