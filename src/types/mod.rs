pub mod config;
pub mod data;
pub mod metric;
pub mod snapshot;
