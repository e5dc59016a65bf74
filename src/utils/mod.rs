// Configuration, errors, snapshot export and summary statistics.

pub mod config;
pub mod error;
pub mod export;
pub mod stats;
