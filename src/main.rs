use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gdpr_tracer::args::Args;
use gdpr_tracer::bench::{create_workload_config, run_bench};
use gdpr_tracer::client::Client;
use gdpr_tracer::config::TracerConfig;
use gdpr_tracer::tracer::TracerClient;
use gdpr_tracer::workload::Generator;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = Arc::new(TracerConfig::from_args(&args)?);
    tracing::info!(config = %serde_json::to_string(config.as_ref())?, "tracer configuration");

    let runtime = configure_runtime(&args)?;
    let generator = Generator::new(create_workload_config(&args))?;

    runtime.block_on(async {
        let client = TracerClient::new(config).await?;
        let result = run_bench(client.clone(), generator, args.num_clients, args.skip_load).await;
        if let Err(e) = client.cleanup().await {
            tracing::error!(error = %e, "failed to close trace file");
        }
        println!("Trace lines written: {}", client.sink().lines_written());
        result
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn configure_runtime(args: &Args) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.worker_threads(args.worker_threads.unwrap_or_else(num_cpus::get).max(1));
    builder.enable_all();
    Ok(builder.build()?)
}

