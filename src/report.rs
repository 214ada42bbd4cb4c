//! Benchmark result collection, rendering, and export.

use std::fmt::{self, Write as _};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::HarnessError;
use crate::profiler::{format_bytes, format_time, Measurement};

/// Outcome of one decoding method on one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    /// Stable identifier, e.g. `whole_decode` or `streaming`.
    pub method: String,
    pub label: String,
    #[serde(flatten)]
    pub measurement: Measurement,
    pub items_processed: usize,
    pub data_size: String,
    pub data_size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    Streaming { reason: String },
    WholeDecode { reason: String },
    Depends,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Streaming { reason } => {
                writeln!(f, "RECOMMENDATION: Use streaming decode")?;
                write!(f, "Reason: {reason}")
            }
            Recommendation::WholeDecode { reason } => {
                writeln!(f, "RECOMMENDATION: Use whole-document decode")?;
                write!(f, "Reason: {reason}")
            }
            Recommendation::Depends => {
                writeln!(f, "RECOMMENDATION: Consider your priorities")?;
                writeln!(f, "- Use whole-document decode if speed is critical and memory is available")?;
                write!(f, "- Use streaming decode if memory efficiency is important")
            }
        }
    }
}

/// Results in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkResults {
    source: Option<PathBuf>,
    results: Vec<MethodResult>,
}

impl BenchmarkResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results measured on the input file at `source`.
    pub fn for_source(source: impl Into<PathBuf>) -> Self {
        Self { source: Some(source.into()), results: Vec::new() }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Add a result, replacing an earlier one for the same method.
    pub fn add(&mut self, result: MethodResult) {
        match self.results.iter_mut().find(|r| r.method == result.method) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, method: &str) -> Option<&MethodResult> {
        self.results.iter().find(|r| r.method == method)
    }

    pub fn results(&self) -> &[MethodResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.results.is_empty() {
            out.push_str("No benchmark results to display.\n");
            return out;
        }
        let rule = "=".repeat(80);
        let _ = writeln!(out, "\n{rule}\nJSON DECODE PERFORMANCE COMPARISON\n{rule}\n");
        for r in &self.results {
            let _ = writeln!(out, "Method: {}", r.label);
            let _ = writeln!(out, "{}", "-".repeat(40));
            let _ = writeln!(out, "Execution Time: {}", r.measurement.execution_time_formatted);
            let _ = writeln!(out, "Memory Used: {}", r.measurement.memory_used_formatted);
            let _ = writeln!(out, "Peak Memory: {}", r.measurement.peak_memory_formatted);
            let _ = writeln!(out, "Items Processed: {}", group_thousands(r.items_processed));
            let _ = writeln!(out, "Data Size: {}\n", r.data_size);
        }
        if self.results.len() > 1 {
            self.render_comparison(&mut out);
        }
        out
    }

    fn render_comparison(&self, out: &mut String) {
        let (a, b) = (&self.results[0], &self.results[1]);
        let rule = "=".repeat(80);
        let _ = writeln!(out, "{rule}\nPERFORMANCE COMPARISON\n{rule}\n");

        let (t1, t2) = (a.measurement.execution_time, b.measurement.execution_time);
        let _ = writeln!(out, "EXECUTION TIME:");
        let (fast, slow, lo, hi) = if t1 < t2 { (a, b, t1, t2) } else { (b, a, t2, t1) };
        match percent_gap(lo, hi) {
            Some(pct) => {
                let _ = writeln!(out, "{} is {pct:.2}% faster than {}", fast.label, slow.label);
            }
            None => {
                let _ = writeln!(out, "{} and {} are not comparable (zero time)", a.label, b.label);
            }
        }

        let (m1, m2) = (a.measurement.peak_memory, b.measurement.peak_memory);
        let _ = writeln!(out, "\nMEMORY USAGE:");
        let (lean, heavy, lo, hi) = if m1 < m2 { (a, b, m1, m2) } else { (b, a, m2, m1) };
        match percent_gap(lo as f64, hi as f64) {
            Some(pct) => {
                let _ = writeln!(out, "{} uses {pct:.2}% less memory than {}", lean.label, heavy.label);
            }
            None => {
                let _ = writeln!(out, "Peak memory not comparable (a measurement is zero)");
            }
        }

        let _ = writeln!(out, "\nTime difference: {}", format_time((t1 - t2).abs()));
        let _ = writeln!(out, "Memory difference: {}\n", format_bytes(m1.abs_diff(m2)));
    }

    /// Pick a method from the measured ratios. `whole_decode_ran` is false when
    /// the policy skipped whole-document decode.
    pub fn recommend(&self, whole_decode_ran: bool) -> Recommendation {
        if !whole_decode_ran {
            return Recommendation::Streaming {
                reason: "File is too large for whole-document decode with the configured memory limit; \
                         streaming processes it with minimal memory."
                    .to_string(),
            };
        }
        let (Some(whole), Some(stream)) = (self.get("whole_decode"), self.get("streaming")) else {
            return Recommendation::Depends;
        };
        let memory_ratio = ratio(stream.measurement.peak_memory as f64, whole.measurement.peak_memory as f64);
        let time_ratio = ratio(stream.measurement.execution_time, whole.measurement.execution_time);
        if memory_ratio < 0.5 && time_ratio < 2.0 {
            Recommendation::Streaming {
                reason: "Significant memory savings with acceptable performance overhead.".to_string(),
            }
        } else if time_ratio > 3.0 && memory_ratio > 0.8 {
            Recommendation::WholeDecode {
                reason: "Better performance with manageable memory usage.".to_string(),
            }
        } else {
            Recommendation::Depends
        }
    }

    /// Method key to result, preceded by a `source` entry when the input is known.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(source) = &self.source {
            map.insert("source".to_string(), Value::String(source.display().to_string()));
        }
        for r in &self.results {
            map.insert(r.method.clone(), serde_json::to_value(r).unwrap_or(Value::Null));
        }
        Value::Object(map)
    }

    /// Write `benchmark_results_<stem>_<timestamp>.json` into `dir`, creating
    /// it if needed. An existing file is never overwritten: a clashing name
    /// gets a `_1`, `_2`, ... suffix.
    pub fn export_json(&self, dir: &Path) -> Result<PathBuf, HarnessError> {
        fs::create_dir_all(dir)?;
        let stem = self
            .source
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| format!("{}_", stem.to_string_lossy()))
            .unwrap_or_default();
        let base = format!("benchmark_results_{stem}{}", Local::now().format("%Y-%m-%d_%H-%M-%S_%3f"));

        let mut attempt = 0u32;
        let (path, file) = loop {
            let name = match attempt {
                0 => format!("{base}.json"),
                n => format!("{base}_{n}.json"),
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_json())?;
        writer.flush()?;
        info!(target: "streamdecode::report", file = %path.display(), "results exported");
        Ok(path)
    }
}

/// `(hi - lo) / lo` as a percentage, if `lo` is non-zero.
fn percent_gap(lo: f64, hi: f64) -> Option<f64> {
    (lo > 0.0).then(|| (hi - lo) / lo * 100.0)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
