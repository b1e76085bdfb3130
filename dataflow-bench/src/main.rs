//! Benchmark runner for dataflow pipelines
//!
//! Usage: `dataflow-bench [config.json]`

use anyhow::Context;
use dataflow_bench::{run_all, BenchConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BenchConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => BenchConfig::default(),
    };

    println!("=== Dataflow Pipeline Benchmarks ===");
    println!(
        "elements: {}, batch size: {}, worker threads: {}",
        config.num_elements, config.batch_size, config.pipeline.worker_threads
    );

    for result in run_all(&config)? {
        println!("\n{result}");
    }

    // Batch size sweep over the cheapest pipeline
    println!("\n=== Batch Size Sweep ===");
    for batch_size in [1, 32, 256, 4096] {
        let config = BenchConfig {
            batch_size,
            iterations: 3,
            warmup_iterations: 1,
            ..config.clone()
        };
        let ctx = dataflow_bench::bench_context(&config)?;
        let dataset = dataflow_bench::batch_pipeline(&config)?;
        let result = dataflow_bench::run_benchmark("range/batch", &config, &ctx, &dataset)?;
        println!("\nBatch size: {batch_size}");
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} batches/sec", result.throughput);
    }
    Ok(())
}
