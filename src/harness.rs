//! Whole-document decode vs streaming decode runs.
//!
//! Both runs count items the same way: one item per `(key, value)` pair the
//! path expression selects. Whether whole-document decode is attempted at all
//! is decided up front by a [`DecodePolicy`], never by catching a failure.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{BenchConfig, MemoryLimit};
use crate::error::HarnessError;
use crate::path::PathExpression;
use crate::profiler::{format_bytes, Measurement, MeasurementSession};
use crate::report::{BenchmarkResults, MethodResult, Recommendation};
use crate::selector::Selector;
use crate::tokenizer::{Tokenizer, DEFAULT_BUFFER_SIZE};

/// Memory is sampled every this many streamed items.
pub const RECORD_INTERVAL: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    WholeDecode,
    Streaming,
}

impl Method {
    pub fn key(self) -> &'static str {
        match self {
            Method::WholeDecode => "whole_decode",
            Method::Streaming => "streaming",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::WholeDecode => "Whole-document decode",
            Method::Streaming => "Streaming decode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Run,
    Skip { reason: String },
}

/// Decides whether a file is small enough to decode in one piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodePolicy {
    pub memory_limit: MemoryLimit,
    /// Share of the memory limit the raw file may occupy.
    pub ratio: f64,
}

impl DecodePolicy {
    pub const DEFAULT_RATIO: f64 = 0.25;

    pub fn new(memory_limit: MemoryLimit) -> Self {
        Self { memory_limit, ratio: Self::DEFAULT_RATIO }
    }

    pub fn plan(&self, file_size: u64) -> Plan {
        let Some(limit) = self.memory_limit.bytes() else {
            return Plan::Run;
        };
        let budget = limit as f64 * self.ratio;
        if file_size as f64 > budget {
            Plan::Skip {
                reason: format!(
                    "file size ({}) is too large for the memory limit ({})",
                    format_bytes(file_size),
                    format_bytes(limit)
                ),
            }
        } else {
            Plan::Run
        }
    }
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self::new(MemoryLimit::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(MethodResult),
    Skipped { reason: String },
}

/// Items the path selects from an already decoded document.
///
/// A decoded object keeps only the last of any duplicate keys, while the
/// streaming selector yields every occurrence, so the two counts differ on
/// such input.
pub fn count_items(document: &Value, path: &PathExpression) -> usize {
    path.select(document).len()
}

/// Read the whole file, then decode it with `serde_json`. Memory is measured
/// from after the read so the figure covers decoding only.
#[instrument(target = "streamdecode::harness", skip_all, fields(file = %file.display(), path = %path))]
pub fn run_whole_decode(file: &Path, path: &PathExpression, policy: &DecodePolicy) -> Result<RunOutcome, HarnessError> {
    let file_size = fs::metadata(file)?.len();
    if let Plan::Skip { reason } = policy.plan(file_size) {
        warn!(target: "streamdecode::harness", %reason, "skipping whole-document decode");
        return Ok(RunOutcome::Skipped { reason });
    }

    let mut session = MeasurementSession::start();
    let bytes = fs::read(file)?;
    let data_size = bytes.len() as u64;
    session.reset();

    let document: Value = serde_json::from_slice(&bytes)?;
    let items = count_items(&document, path);
    let measurement = session.finish();
    drop(document);
    drop(bytes);

    debug!(target: "streamdecode::harness", items, elapsed = %measurement.execution_time_formatted, "whole-document decode finished");
    Ok(RunOutcome::Completed(method_result(Method::WholeDecode, measurement, items, data_size)))
}

/// Stream the file through a [`Selector`], optionally stopping after `max_items`.
#[instrument(target = "streamdecode::harness", skip_all, fields(file = %file.display(), path = %path))]
pub fn run_streaming(
    file: &Path,
    path: &PathExpression,
    max_items: Option<usize>,
    buffer_size: usize,
) -> Result<MethodResult, HarnessError> {
    let data_size = fs::metadata(file)?.len();
    let mut session = MeasurementSession::start();
    let tokenizer = Tokenizer::with_buffer_size(File::open(file)?, buffer_size);
    let mut selector = Selector::with_tokenizer(tokenizer, path.clone());

    let mut items = 0;
    for item in selector.by_ref() {
        let (_key, value) = item?;
        drop(value);
        items += 1;
        if items % RECORD_INTERVAL == 0 {
            session.record();
        }
        if max_items.is_some_and(|max| items >= max) {
            info!(target: "streamdecode::harness", items, "item limit reached, stopping early");
            break;
        }
    }
    drop(selector);
    let measurement = session.finish();

    debug!(target: "streamdecode::harness", items, elapsed = %measurement.execution_time_formatted, "streaming decode finished");
    Ok(method_result(Method::Streaming, measurement, items, data_size))
}

fn method_result(method: Method, measurement: Measurement, items: usize, data_size: u64) -> MethodResult {
    MethodResult {
        method: method.key().to_string(),
        label: method.label().to_string(),
        measurement,
        items_processed: items,
        data_size: format_bytes(data_size),
        data_size_bytes: data_size,
    }
}

/// A few tiny decodes so first-use costs don't land in the first measurement.
pub fn warm_up() {
    for _ in 0..3 {
        let _ = std::hint::black_box(serde_json::from_str::<Value>(r#"{"test": "warmup"}"#));
        let _ = Selector::new(&br#"{"test": "warmup"}"#[..], PathExpression::default()).count();
    }
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub path: PathExpression,
    pub policy: DecodePolicy,
    pub max_items: Option<usize>,
    pub buffer_size: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            path: PathExpression::default(),
            policy: DecodePolicy::default(),
            max_items: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl From<&BenchConfig> for CompareOptions {
    fn from(config: &BenchConfig) -> Self {
        Self {
            policy: DecodePolicy::new(config.memory_limit),
            buffer_size: config.buffer_size,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub file: PathBuf,
    pub results: BenchmarkResults,
    /// Why whole-document decode did not run, if it didn't.
    pub whole_decode_skipped: Option<String>,
}

impl Comparison {
    pub fn whole_decode_ran(&self) -> bool {
        self.whole_decode_skipped.is_none()
    }

    pub fn recommendation(&self) -> Recommendation {
        self.results.recommend(self.whole_decode_ran())
    }
}

/// Run both methods on `file`, whole-document decode first.
pub fn compare(file: &Path, options: &CompareOptions) -> Result<Comparison, HarnessError> {
    info!(
        target: "streamdecode::harness",
        file = %file.display(),
        size = %format_bytes(fs::metadata(file)?.len()),
        memory_limit = %options.policy.memory_limit,
        "starting comparison"
    );
    warm_up();

    let mut results = BenchmarkResults::for_source(file);
    let whole_decode_skipped = match run_whole_decode(file, &options.path, &options.policy)? {
        RunOutcome::Completed(result) => {
            results.add(result);
            None
        }
        RunOutcome::Skipped { reason } => Some(reason),
    };
    results.add(run_streaming(file, &options.path, options.max_items, options.buffer_size)?);

    Ok(Comparison { file: file.to_path_buf(), results, whole_decode_skipped })
}
