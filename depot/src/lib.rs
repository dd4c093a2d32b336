//! cidepot library
//!
//! Build metrics and deployment history for a CI pipeline.

pub mod app;
pub mod cli;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod ledger;
pub mod logs;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
