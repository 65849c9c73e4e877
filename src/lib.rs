pub mod cli;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod github;
pub mod pagination;
pub mod report;
