use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task;

use crate::args::Args;
use crate::client::{Client, Operation};
use crate::metrics::{ConcurrentMetrics, Metrics};
use crate::workload::{record_key, Generator, Request, WorkloadConfig};

pub fn create_workload_config(args: &Args) -> WorkloadConfig {
    WorkloadConfig {
        workload: args.workload,
        record_count: args.record_count,
        operation_count: args.operation_count,
        user_count: args.user_count,
        purpose_count: args.purpose_count,
        objection_start: args.objection_start,
        objection_count: args.objection_count,
        data_size: args.data_size,
        scan_length: args.scan_length,
        log_count: args.log_count,
        key_distribution: args.key_distribution,
        load_pattern: args.load_pattern,
    }
}

pub async fn run_bench<C: Client + Clone + 'static>(
    client: C,
    generator: Generator,
    num_clients: u32,
    skip_load: bool,
) -> Result<()> {
    let started = chrono::Utc::now();

    if skip_load {
        println!("Skipping load phase");
    } else {
        let load = load_initial_dataset(&client, &generator).await?;
        println!("Load Phase Results:");
        println!("{}", load);
    }

    let run = run_concurrent_benchmark(client, Arc::new(generator), num_clients).await?;
    println!("Run Phase Results:");
    println!("{}", run);

    let elapsed = chrono::Utc::now() - started;
    println!(
        "Traced {} operations ({} failed) in {} ms",
        run.total_operations(),
        run.total_failures(),
        elapsed.num_milliseconds()
    );
    Ok(())
}

pub async fn load_initial_dataset<C: Client>(client: &C, generator: &Generator) -> Result<Metrics> {
    let metrics = ConcurrentMetrics::default();
    let mut rng = StdRng::from_entropy();
    let order = generator.load_order(&mut rng);

    println!(
        "Loading initial dataset with {:?} pattern...",
        generator.config().load_pattern
    );

    for (i, index) in order.into_iter().enumerate() {
        if i % 10_000 == 0 {
            tracing::debug!(progress = i, total = generator.config().record_count, "loading");
        }

        let request = Request::Insert {
            key: record_key(index),
            values: generator.record(index, &mut rng),
        };
        let start = Instant::now();
        let status = request.issue(client).await;
        metrics.record(Operation::Insert, start.elapsed()).await;
        if !status.is_ok() {
            metrics.record_failure(Operation::Insert).await;
        }
    }

    Ok(metrics.get_metrics().await)
}

pub async fn run_concurrent_benchmark<C: Client + Clone + 'static>(
    client: C,
    generator: Arc<Generator>,
    num_clients: u32,
) -> Result<Metrics> {
    let num_clients = num_clients.max(1);
    let operation_count = generator.config().operation_count;
    println!(
        "Starting {:?} workload with {} concurrent clients...",
        generator.config().workload,
        num_clients
    );

    let metrics = ConcurrentMetrics::default();
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let client = client.clone();
        let generator = generator.clone();
        let metrics = metrics.clone();
        // Spread the remainder over the first clients.
        let ops = operation_count / u64::from(num_clients)
            + u64::from(u64::from(client_id) < operation_count % u64::from(num_clients));

        let handle = task::spawn(async move {
            tracing::debug!(client_id, ops, "starting client");
            let mut rng = StdRng::from_entropy();

            for i in 0..ops {
                if i % 1000 == 0 && i > 0 {
                    tracing::debug!(client_id, progress = i, total = ops, "running");
                }

                let request = generator.next_request(&mut rng);
                let operation = request.operation();
                let start = Instant::now();
                let status = request.issue(&client).await;
                metrics.record(operation, start.elapsed()).await;
                if !status.is_ok() {
                    metrics.record_failure(operation).await;
                }
            }

            Ok::<_, anyhow::Error>(())
        });

        handles.push(handle);
    }

    for handle in handles {
        handle.await??;
    }

    Ok(metrics.get_metrics().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::tracer::TracerClient;
    use crate::workload::{KeyDistribution, LoadPattern, WorkloadType};
    use tempfile::tempdir;

    fn workload_config(workload: WorkloadType, operation_count: u64) -> WorkloadConfig {
        WorkloadConfig {
            workload,
            record_count: 20,
            operation_count,
            user_count: 10,
            purpose_count: 4,
            objection_start: 25,
            objection_count: 5,
            data_size: 8,
            scan_length: 5,
            log_count: 3,
            key_distribution: KeyDistribution::Uniform,
            load_pattern: LoadPattern::Random,
        }
    }

    #[tokio::test]
    async fn load_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = TracerClient::new(Arc::new(test_config(&path))).await.unwrap();
        let generator = Generator::new(workload_config(WorkloadType::Mixed, 0)).unwrap();

        let metrics = load_initial_dataset(&client, &generator).await.unwrap();
        client.cleanup().await.unwrap();

        assert_eq!(metrics.total_operations(), 20);
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|line| line.starts_with("query(PUT(\"key")));
        assert!(lines.iter().all(|line| line.ends_with(")") && !line.ends_with("&")));
    }

    #[tokio::test]
    async fn concurrent_run_traces_every_operation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = TracerClient::new(Arc::new(test_config(&path))).await.unwrap();
        // Controller never issues expiry checks, so every operation writes a line.
        let generator = Generator::new(workload_config(WorkloadType::Controller, 103)).unwrap();

        let metrics = run_concurrent_benchmark(client.clone(), Arc::new(generator), 4)
            .await
            .unwrap();
        client.cleanup().await.unwrap();

        assert_eq!(metrics.total_operations(), 103);
        assert_eq!(metrics.total_failures(), 0);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 103);
        assert!(contents.lines().all(|line| line.starts_with("query(")));
    }
}
