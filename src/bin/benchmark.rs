use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use futures_util::{pin_mut, StreamExt};
use streamdecode::config::{BenchConfig, EnvSetting, MemoryLimit};
use streamdecode::fixtures::write_user_records;
use streamdecode::harness::{compare, CompareOptions, Comparison, DecodePolicy};
use streamdecode::profiler::{format_bytes, live_bytes, tracking_active, CountingAllocator, MeasurementSession};
use streamdecode::streaming::select_stream;
use streamdecode::{PathExpression, PathKey, Selector, Tokenizer, Value};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

/// How often `select` prints the memory in use.
const MEMORY_REPORT_INTERVAL: usize = 100;

#[derive(Parser)]
#[command(author, version, about = "Whole-document vs streaming JSON decode benchmark", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare whole-document decode against streaming decode
    Compare(CompareArgs),
    /// Stream the values selected by a path and print them as they arrive
    Select(SelectArgs),
    /// Write a JSON array of generated user records
    Generate(GenerateArgs),
}

#[derive(ClapArgs)]
struct CompareArgs {
    /// JSON files to benchmark; several files run in parallel
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path expression selecting the items to count
    #[arg(short, long, default_value = "/*")]
    path: String,

    /// Memory budget, e.g. 512M, 2G, or -1 for unlimited
    #[arg(short, long)]
    memory_limit: Option<String>,

    /// Directory for the exported JSON results
    #[arg(short, long)]
    results_dir: Option<PathBuf>,

    /// Stop streaming after this many items
    #[arg(long)]
    max_items: Option<usize>,

    /// Don't write the results file
    #[arg(long)]
    no_export: bool,
}

#[derive(ClapArgs)]
struct SelectArgs {
    file: PathBuf,

    #[arg(short, long, default_value = "/*")]
    path: String,

    /// Stop after this many items
    #[arg(short, long)]
    limit: Option<usize>,

    /// Read through the async adapter instead of a blocking file handle
    #[arg(long = "async")]
    use_async: bool,
}

#[derive(ClapArgs)]
struct GenerateArgs {
    file: PathBuf,

    #[arg(short, long, default_value_t = 10_000)]
    count: u64,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "streamdecode=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !tracking_active() {
        eprintln!("warning: allocation tracking is inactive, memory figures will read zero");
    }

    let config = BenchConfig::from_env().context("reading configuration from the environment")?;

    match args.command {
        Command::Compare(cmd) => run_compare(cmd, &config).await,
        Command::Select(cmd) => {
            if cmd.use_async {
                run_select_async(cmd).await
            } else {
                let buffer_size = config.buffer_size;
                tokio::task::spawn_blocking(move || run_select(cmd, buffer_size)).await?
            }
        }
        Command::Generate(cmd) => run_generate(cmd),
    }
}

async fn run_compare(cmd: CompareArgs, config: &BenchConfig) -> Result<()> {
    let mut options = CompareOptions::from(config);
    options.path = PathExpression::parse(&cmd.path)?;
    options.max_items = cmd.max_items;
    if let Some(raw) = &cmd.memory_limit {
        options.policy = DecodePolicy::new(MemoryLimit::parse_setting(raw)?);
    }
    let results_dir = cmd.results_dir.clone().unwrap_or_else(|| config.results_dir.clone());

    let mut join_set = JoinSet::new();
    for file in cmd.files {
        let options = options.clone();
        join_set.spawn_blocking(move || {
            let outcome = compare(&file, &options);
            (file, outcome)
        });
    }

    let mut failures = 0;
    while let Some(joined) = join_set.join_next().await {
        let (file, outcome) = joined.context("benchmark task panicked")?;
        match outcome {
            Ok(comparison) => print_comparison(&comparison, &options, &results_dir, cmd.no_export)?,
            Err(e) => {
                eprintln!("Benchmark of {} failed: {e}", file.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} benchmark(s) failed");
    }
    Ok(())
}

fn print_comparison(comparison: &Comparison, options: &CompareOptions, results_dir: &Path, no_export: bool) -> Result<()> {
    let size = std::fs::metadata(&comparison.file)?.len();
    println!("JSON Decode Performance Comparison");
    println!("File: {}", comparison.file.display());
    println!("File size: {}", format_bytes(size));
    println!("Memory limit: {}", options.policy.memory_limit);
    println!("Path: {}", options.path);
    if let Some(reason) = &comparison.whole_decode_skipped {
        println!("\nWARNING: {reason}");
        println!("Skipped whole-document decode to prevent memory exhaustion.");
    }
    print!("{}", comparison.results.render());
    println!("{}\n", comparison.recommendation());

    if !no_export {
        let exported = comparison.results.export_json(results_dir)?;
        println!("Results exported to: {}", exported.display());
    }
    Ok(())
}

fn run_select(cmd: SelectArgs, buffer_size: usize) -> Result<()> {
    let path = PathExpression::parse(&cmd.path)?;
    let file = File::open(&cmd.file).with_context(|| format!("opening {}", cmd.file.display()))?;
    let selector = Selector::with_tokenizer(Tokenizer::with_buffer_size(file, buffer_size), path);

    let mut session = MeasurementSession::start();
    let mut count = 0;
    for item in selector {
        let (key, value) = item?;
        count += 1;
        print_item(count, &key, &value);
        if count % MEMORY_REPORT_INTERVAL == 0 {
            session.record();
        }
        if cmd.limit.is_some_and(|limit| count >= limit) {
            break;
        }
    }
    print_session(count, session);
    Ok(())
}

async fn run_select_async(cmd: SelectArgs) -> Result<()> {
    let path = PathExpression::parse(&cmd.path)?;
    let file = tokio::fs::File::open(&cmd.file)
        .await
        .with_context(|| format!("opening {}", cmd.file.display()))?;

    // The selector runs on a blocking worker, so only the printing side is measured here.
    let session = MeasurementSession::start();
    let items = select_stream(file, path);
    pin_mut!(items);
    let mut count = 0;
    while let Some(item) = items.next().await {
        let (key, value) = item?;
        count += 1;
        print_item(count, &key, &value);
        if cmd.limit.is_some_and(|limit| count >= limit) {
            break;
        }
    }
    print_session(count, session);
    Ok(())
}

fn print_item(count: usize, key: &PathKey, value: &Value) {
    println!("{key}: {}", summarize(value));
    if count % MEMORY_REPORT_INTERVAL == 0 {
        println!("  [{count} items, memory in use: {}]", format_bytes(live_bytes() as u64));
    }
}

fn print_session(count: usize, session: MeasurementSession) {
    let measurement = session.finish();
    println!("\nItems: {count}");
    println!("Execution Time: {}", measurement.execution_time_formatted);
    println!("Memory Used: {}", measurement.memory_used_formatted);
    println!("Peak Memory: {}", measurement.peak_memory_formatted);
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("object with {} keys", map.len()),
        Value::Array(items) => format!("array with {} items", items.len()),
        Value::String(s) if s.chars().count() > 60 => {
            let head: String = s.chars().take(57).collect();
            format!("\"{head}...\"")
        }
        other => other.to_string(),
    }
}

fn run_generate(cmd: GenerateArgs) -> Result<()> {
    if let Some(parent) = cmd.file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&cmd.file).with_context(|| format!("creating {}", cmd.file.display()))?;
    write_user_records(BufWriter::new(file), cmd.count)?;
    let size = std::fs::metadata(&cmd.file)?.len();
    println!("Generated {} with {} items", cmd.file.display(), cmd.count);
    println!("File size: {}", format_bytes(size));
    Ok(())
}
