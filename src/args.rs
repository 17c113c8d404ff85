use std::path::PathBuf;

use crate::workload::{KeyDistribution, LoadPattern, WorkloadType};
use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub struct Args {
    /// File the query trace is appended to (created if missing)
    #[arg(short = 'f', long)]
    pub trace_file: PathBuf,

    /// Replace record values with a fixed placeholder in the trace
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub mock_values: bool,

    /// Number of records in the data set
    #[arg(long, default_value = "1000")]
    pub record_count: u64,

    /// Number of distinct data owners
    #[arg(long, default_value = "100")]
    pub user_count: u64,

    /// Number of distinct processing purposes
    #[arg(long, default_value = "10")]
    pub purpose_count: u64,

    /// First objection identifier
    #[arg(long, default_value = "0")]
    pub objection_start: u64,

    /// Number of objection identifiers
    #[arg(long, default_value = "10")]
    pub objection_count: u64,

    /// Workload to trace
    #[arg(short, long, default_value = "mixed")]
    pub workload: WorkloadType,

    /// Number of operations to perform after loading
    #[arg(long, default_value = "1000")]
    pub operation_count: u64,

    /// Number of concurrent clients
    #[arg(long, default_value = "1")]
    pub num_clients: u32,

    /// Runtime worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Distribution of keys picked by the run phase
    #[arg(long, default_value = "uniform")]
    pub key_distribution: KeyDistribution,

    /// Pattern for loading initial data (sequential or random)
    #[arg(long, default_value = "sequential")]
    pub load_pattern: LoadPattern,

    /// Skip the load phase and trace only the run phase
    #[arg(long)]
    pub skip_load: bool,

    /// Size of the generated data payload in bytes
    #[arg(long, default_value = "32")]
    pub data_size: usize,

    /// Records requested per scan
    #[arg(long, default_value = "100")]
    pub scan_length: usize,

    /// Log entries requested per log read
    #[arg(long, default_value = "10")]
    pub log_count: usize,
}
