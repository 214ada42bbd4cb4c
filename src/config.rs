use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HarnessError;
use crate::tokenizer::DEFAULT_BUFFER_SIZE;

/// A setting that can be read from the environment (or a `.env` file).
pub trait EnvSetting: Sized {
    /// The environment variable holding this setting.
    const VAR_NAME: &'static str;

    fn parse_setting(raw: &str) -> Result<Self, HarnessError>;

    /// Look the setting up, loading `.env` first (a missing file is fine).
    fn from_env() -> Result<Option<Self>, HarnessError> {
        let _ = dotenvy::dotenv();
        match env::var(Self::VAR_NAME) {
            Ok(raw) => {
                debug!(target: "streamdecode::config", var = Self::VAR_NAME, value = %raw, "setting from environment");
                Self::parse_setting(raw.trim()).map(Some)
            }
            Err(_) => Ok(None),
        }
    }
}

/// Memory budget used to decide up front whether whole-document decode is
/// attempted. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimit(pub Option<u64>);

impl MemoryLimit {
    pub const DEFAULT_BYTES: u64 = 512 * 1024 * 1024;

    pub fn unlimited() -> Self {
        MemoryLimit(None)
    }

    pub fn bytes(self) -> Option<u64> {
        self.0
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        MemoryLimit(Some(Self::DEFAULT_BYTES))
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(bytes) => f.write_str(&crate::profiler::format_bytes(bytes)),
            None => f.write_str("unlimited"),
        }
    }
}

impl EnvSetting for MemoryLimit {
    const VAR_NAME: &'static str = "STREAMDECODE_MEMORY_LIMIT";

    fn parse_setting(raw: &str) -> Result<Self, HarnessError> {
        if raw == "-1" || raw.eq_ignore_ascii_case("unlimited") {
            return Ok(MemoryLimit::unlimited());
        }
        parse_size(raw).map(|bytes| MemoryLimit(Some(bytes)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSize(pub usize);

impl EnvSetting for BufferSize {
    const VAR_NAME: &'static str = "STREAMDECODE_BUFFER_SIZE";

    fn parse_setting(raw: &str) -> Result<Self, HarnessError> {
        let bytes = parse_size(raw)?;
        usize::try_from(bytes)
            .map(BufferSize)
            .map_err(|_| HarnessError::InvalidSize(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsDir(pub PathBuf);

impl EnvSetting for ResultsDir {
    const VAR_NAME: &'static str = "STREAMDECODE_RESULTS_DIR";

    fn parse_setting(raw: &str) -> Result<Self, HarnessError> {
        if raw.is_empty() {
            return Err(HarnessError::InvalidSetting(Self::VAR_NAME));
        }
        Ok(ResultsDir(PathBuf::from(raw)))
    }
}

/// Defaults for the benchmark harness; command-line flags override them.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub memory_limit: MemoryLimit,
    pub buffer_size: usize,
    pub results_dir: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            memory_limit: MemoryLimit::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl BenchConfig {
    pub fn from_env() -> Result<Self, HarnessError> {
        let defaults = Self::default();
        Ok(Self {
            memory_limit: MemoryLimit::from_env()?.unwrap_or(defaults.memory_limit),
            buffer_size: BufferSize::from_env()?.map(|b| b.0).unwrap_or(defaults.buffer_size),
            results_dir: ResultsDir::from_env()?.map(|d| d.0).unwrap_or(defaults.results_dir),
        })
    }
}

/// Parse `512M`, `2g`, `64K` or a plain byte count.
pub fn parse_size(raw: &str) -> Result<u64, HarnessError> {
    let invalid = || HarnessError::InvalidSize(raw.to_string());
    let trimmed = raw.trim();
    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c.to_ascii_lowercase() {
                'k' => 1024,
                'm' => 1024 * 1024,
                'g' => 1024 * 1024 * 1024,
                _ => return Err(invalid()),
            };
            (&trimmed[..i], multiplier)
        }
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse_with_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("128m").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("12X").is_err());
        assert!(parse_size("M").is_err());
    }

    #[test]
    fn memory_limit_accepts_unlimited() {
        assert_eq!(MemoryLimit::parse_setting("-1").unwrap(), MemoryLimit::unlimited());
        assert_eq!(MemoryLimit::parse_setting("Unlimited").unwrap(), MemoryLimit::unlimited());
        assert_eq!(MemoryLimit::parse_setting("1K").unwrap(), MemoryLimit(Some(1024)));
    }
}
