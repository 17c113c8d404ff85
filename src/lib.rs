pub mod args;
pub mod bench;
pub mod client;
pub mod config;
pub mod field;
pub mod identity;
pub mod metrics;
pub mod sink;
pub mod tracer;
pub mod workload;
