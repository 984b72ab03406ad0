pub mod config;
pub mod csv_import;
pub mod dedup;
pub mod error;
pub mod job_log;
pub mod logging;
pub mod maintenance;
pub mod matches;
pub mod models;
pub mod odds;
pub mod pipeline;
pub mod report_export;
pub mod reports;
pub mod resolver;
pub mod schema;
pub mod staging;
pub mod store;

pub use error::{EtlError, Result};
