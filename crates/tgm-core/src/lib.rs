//! Core domain + application logic for the Telegram channel monitor.
//!
//! This crate is framework-agnostic. The remote session gateway, SQLite and
//! HTTP live behind ports (traits) implemented in adapter crates.

pub mod client;
pub mod config;
pub mod domain;
pub mod engagement;
pub mod errors;
pub mod logging;
pub mod normalize;
pub mod pacing;
pub mod pipeline;
pub mod poller;
pub mod ratelimit;
pub mod retry;
pub mod service;
pub mod store;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use errors::{Error, Result};
