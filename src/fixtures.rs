//! Test and benchmark inputs.

use std::io::{self, Read, Write};

use chrono::DateTime;
use serde::Serialize;
use tracing::debug;

/// Fixed reference instant so generated files are reproducible.
const EPOCH: i64 = 1_700_000_000;
const YEAR_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub data: String,
}

impl UserRecord {
    /// Deterministic record for `id`; the payload length varies with the id.
    pub fn generate(id: u64) -> Self {
        let offset = ((id as i64) * 7919) % YEAR_SECS;
        let created_at = DateTime::from_timestamp(EPOCH - offset, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let repeats = 10 + (id as usize * 31) % 41;
        Self {
            id,
            name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            created_at,
            data: format!("Sample data for user {id} ").repeat(repeats),
        }
    }
}

/// Write a pretty-printed JSON array of `count` user records, one at a time.
pub fn write_user_records<W: Write>(mut writer: W, count: u64) -> io::Result<()> {
    writer.write_all(b"[\n")?;
    for id in 1..=count {
        if id > 1 {
            writer.write_all(b",\n")?;
        }
        serde_json::to_writer_pretty(&mut writer, &UserRecord::generate(id))?;
    }
    writer.write_all(b"\n]\n")?;
    writer.flush()?;
    debug!(target: "streamdecode::fixtures", count, "user records written");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Elements,
    Trailer,
    Done,
}

/// A `Read` producing `{"items":[<element> x count],"target":<target>}`
/// without ever holding more than one element in memory.
#[derive(Debug)]
pub struct RepeatedElementSource {
    element: Vec<u8>,
    target: Vec<u8>,
    count: usize,
    emitted: usize,
    stage: Stage,
    pending: Vec<u8>,
    cursor: usize,
}

impl RepeatedElementSource {
    /// `element` and `target` are raw JSON texts, emitted verbatim.
    pub fn new(element: &str, count: usize, target: &str) -> Self {
        Self {
            element: element.as_bytes().to_vec(),
            target: target.as_bytes().to_vec(),
            count,
            emitted: 0,
            stage: Stage::Header,
            pending: Vec::with_capacity(element.len().max(target.len()) + 16),
            cursor: 0,
        }
    }

    /// Total number of bytes the source will produce.
    pub fn total_len(&self) -> usize {
        let header = br#"{"items":["#.len();
        let trailer = br#"],"target":"#.len() + self.target.len() + 1;
        let elements = self.count * self.element.len() + self.count.saturating_sub(1);
        header + elements + trailer
    }

    fn refill(&mut self) {
        self.pending.clear();
        self.cursor = 0;
        match self.stage {
            Stage::Header => {
                self.pending.extend_from_slice(br#"{"items":["#);
                self.stage = if self.count == 0 { Stage::Trailer } else { Stage::Elements };
            }
            Stage::Elements => {
                if self.emitted > 0 {
                    self.pending.push(b',');
                }
                self.pending.extend_from_slice(&self.element);
                self.emitted += 1;
                if self.emitted == self.count {
                    self.stage = Stage::Trailer;
                }
            }
            Stage::Trailer => {
                self.pending.extend_from_slice(br#"],"target":"#);
                self.pending.extend_from_slice(&self.target);
                self.pending.push(b'}');
                self.stage = Stage::Done;
            }
            Stage::Done => {}
        }
    }
}

impl Read for RepeatedElementSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.cursor == self.pending.len() {
            if self.stage == Stage::Done {
                return Ok(0);
            }
            self.refill();
        }
        let n = out.len().min(self.pending.len() - self.cursor);
        out[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}
