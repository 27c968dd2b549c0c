//! Command-line interface for the scraper service.

mod commands;
pub mod helpers;

pub use commands::{is_verbose, run};
