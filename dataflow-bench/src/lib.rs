//! Throughput benchmarks for dataset pipelines

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dataflow_core::{
    DType, Dataset, DatasetRef, Elements, FunctionRef, PartialShape, PipelineConfig, PipelineContext,
    Tensor, TensorShape,
};
use dataflow_ops::{DatasetExt, IntoDatasetRef, RangeDataset};

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of measured iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Number of source elements per pass
    pub num_elements: i64,

    /// Batch size used by batching pipelines
    pub batch_size: i64,

    /// Shuffle buffer size
    pub shuffle_buffer: i64,

    /// Runtime settings for the pipelines
    pub pipeline: PipelineConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 3,
            num_elements: 100_000,
            batch_size: 128,
            shuffle_buffer: 1024,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading bench config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing bench config {}", path.display()))
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Elements produced by one pass
    pub elements_per_pass: usize,

    /// Throughput (elements/second)
    pub throughput: f64,
}

impl fmt::Display for BenchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark: {}", self.name)?;
        writeln!(f, "  Total time:   {:?}", self.total_time)?;
        writeln!(f, "  Average time: {:?}", self.avg_time)?;
        writeln!(f, "  Min time:     {:?}", self.min_time)?;
        writeln!(f, "  Max time:     {:?}", self.max_time)?;
        write!(f, "  Throughput:   {:.2} elements/sec", self.throughput)
    }
}

/// Pull every element from a fresh iterator over `dataset`
pub fn drain(ctx: &PipelineContext, dataset: &DatasetRef) -> anyhow::Result<usize> {
    let iterator = Arc::clone(dataset).make_iterator();
    let it_ctx = ctx.iterator_context();
    let mut count = 0;
    for element in Elements::new(iterator.as_ref(), &it_ctx) {
        element?;
        count += 1;
    }
    Ok(count)
}

/// Time repeated full passes over `dataset`
pub fn run_benchmark(
    name: &str,
    config: &BenchConfig,
    ctx: &PipelineContext,
    dataset: &DatasetRef,
) -> anyhow::Result<BenchResult> {
    ensure!(config.iterations > 0, "iterations must be greater than zero");

    for _ in 0..config.warmup_iterations {
        drain(ctx, dataset)?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut elements_per_pass = 0;
    let start_total = Instant::now();
    for _ in 0..config.iterations {
        let start = Instant::now();
        elements_per_pass = drain(ctx, dataset)?;
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let min_time = times.iter().copied().min().unwrap_or_default();
    let max_time = times.iter().copied().max().unwrap_or_default();
    let avg_time = times.iter().sum::<Duration>() / u32::try_from(times.len()).unwrap_or(u32::MAX);
    #[allow(clippy::cast_precision_loss)]
    let throughput = (elements_per_pass * config.iterations) as f64 / total_time.as_secs_f64();

    debug!(name, elements_per_pass, ?avg_time, "Finished benchmark");
    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        elements_per_pass,
        throughput,
    })
}

/// Create a context with the functions used by the benchmark pipelines
pub fn bench_context(config: &BenchConfig) -> anyhow::Result<PipelineContext> {
    let ctx = PipelineContext::new(config.pipeline.clone())?;
    let functions = ctx.function_library();
    functions.register_fn("square", |_call, args| {
        let x = args[0].scalar_value::<i64>()?;
        Ok(vec![Tensor::scalar(x.wrapping_mul(x))])
    })?;
    functions.register_fn("is_even", |_call, args| {
        Ok(vec![Tensor::scalar(args[0].scalar_value::<i64>()? % 2 == 0)])
    })?;
    functions.register_fn("ragged_row", |_call, args| {
        let len = args[0].scalar_value::<i64>()?.rem_euclid(8);
        Ok(vec![Tensor::vector((0..len).collect::<Vec<i64>>())])
    })?;
    info!(?ctx, "Created benchmark context");
    Ok(ctx)
}

fn source(config: &BenchConfig) -> anyhow::Result<DatasetRef> {
    Ok(RangeDataset::new(0, config.num_elements, 1)?.into_ref())
}

/// `range -> batch`
pub fn batch_pipeline(config: &BenchConfig) -> anyhow::Result<DatasetRef> {
    Ok(source(config)?.batch(config.batch_size)?)
}

/// `range -> map(square) -> filter(is_even) -> batch`
pub fn map_filter_pipeline(ctx: &PipelineContext, config: &BenchConfig) -> anyhow::Result<DatasetRef> {
    let mapped = source(config)?.map(
        ctx,
        &FunctionRef::new("square"),
        vec![],
        vec![DType::Int64],
        vec![PartialShape::scalar()],
    )?;
    let filtered = mapped.filter(ctx, &FunctionRef::new("is_even"), vec![])?;
    Ok(filtered.batch(config.batch_size)?)
}

/// `range -> shuffle -> batch`
pub fn shuffle_pipeline(ctx: &PipelineContext, config: &BenchConfig) -> anyhow::Result<DatasetRef> {
    let shuffled = source(config)?.shuffle(ctx, config.shuffle_buffer, 7, 11)?;
    Ok(shuffled.batch(config.batch_size)?)
}

/// `range -> map(ragged_row) -> dense_to_sparse_batch`
pub fn sparse_pipeline(ctx: &PipelineContext, config: &BenchConfig) -> anyhow::Result<DatasetRef> {
    let rows = source(config)?.map(
        ctx,
        &FunctionRef::new("ragged_row"),
        vec![],
        vec![DType::Int64],
        vec![PartialShape::new(vec![None])],
    )?;
    Ok(rows.dense_to_sparse_batch(config.batch_size, TensorShape::new(vec![8]))?)
}

/// Run every benchmark pipeline once with `config`
pub fn run_all(config: &BenchConfig) -> anyhow::Result<Vec<BenchResult>> {
    let ctx = bench_context(config)?;
    let pipelines = [
        ("range/batch", batch_pipeline(config)?),
        ("range/map/filter/batch", map_filter_pipeline(&ctx, config)?),
        ("range/shuffle/batch", shuffle_pipeline(&ctx, config)?),
        ("range/map/dense_to_sparse_batch", sparse_pipeline(&ctx, config)?),
    ];
    pipelines
        .iter()
        .map(|(name, dataset)| run_benchmark(name, config, &ctx, dataset))
        .collect()
}
