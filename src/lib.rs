//! Manga scraper task service.
//!
//! Fetches raw chapter images from manga sites into a local directory
//! through a persistent, retryable and idempotent task queue, with queue
//! health alerting and an HTTP API.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod repository;
pub mod scrapers;
pub mod server;
pub mod services;

pub use error::{ErrorCode, ScraperError};
