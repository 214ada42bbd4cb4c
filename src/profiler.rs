//! Time and memory measurement.
//!
//! Memory figures come from [`CountingAllocator`], which wraps the system
//! allocator and keeps live/peak byte counters per thread. A binary (or test
//! crate) opts in with:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: streamdecode::profiler::CountingAllocator = streamdecode::profiler::CountingAllocator;
//! ```
//!
//! Without it every memory figure reads zero. Counters are per thread, so a
//! [`MeasurementSession`] only sees allocations made on the thread that
//! started it, and sessions on different threads never see each other.
//!
//! Each open session owns a peak slot that the allocator raises on every
//! allocation, so sessions may nest or overlap on one thread without
//! disturbing each other's peak.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Sessions that can be open at once on a single thread.
pub const MAX_OPEN_SESSIONS: usize = 32;

const UNSET: Cell<isize> = Cell::new(0);

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
    // Bit `i` set means `PEAKS[i]` belongs to an open session.
    static OPEN: Cell<u32> = const { Cell::new(0) };
    static PEAKS: [Cell<isize>; MAX_OPEN_SESSIONS] = const { [UNSET; MAX_OPEN_SESSIONS] };
}

pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            note_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            note_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        note_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            note_free(layout.size());
            note_alloc(new_size);
        }
        new_ptr
    }
}

// Runs inside the allocator, so it must not allocate.
fn note_alloc(size: usize) {
    let _ = LIVE.try_with(|live| {
        let now = live.get().wrapping_add(size as isize);
        live.set(now);
        let open = OPEN.try_with(Cell::get).unwrap_or(0);
        if open == 0 {
            return;
        }
        let _ = PEAKS.try_with(|peaks| {
            let mut bits = open;
            while bits != 0 {
                let slot = &peaks[bits.trailing_zeros() as usize];
                if now > slot.get() {
                    slot.set(now);
                }
                bits &= bits - 1;
            }
        });
    });
}

fn note_free(size: usize) {
    let _ = LIVE.try_with(|live| live.set(live.get().wrapping_sub(size as isize)));
}

fn live() -> isize {
    LIVE.with(Cell::get)
}

/// Claim a free peak slot, seeded with the current live count.
fn claim_slot(now: isize) -> Option<usize> {
    let open = OPEN.with(Cell::get);
    let slot = (!open).trailing_zeros() as usize;
    if slot >= MAX_OPEN_SESSIONS {
        return None;
    }
    PEAKS.with(|peaks| peaks[slot].set(now));
    OPEN.with(|bits| bits.set(open | (1 << slot)));
    Some(slot)
}

fn release_slot(slot: usize) {
    let _ = OPEN.try_with(|bits| bits.set(bits.get() & !(1 << slot)));
}

fn slot_peak(slot: usize) -> isize {
    PEAKS.with(|peaks| peaks[slot].get())
}

/// Bytes currently allocated by this thread, as seen by [`CountingAllocator`].
pub fn live_bytes() -> usize {
    live().max(0) as usize
}

/// Whether [`CountingAllocator`] is installed as the global allocator.
pub fn tracking_active() -> bool {
    let before = live();
    let sample = std::hint::black_box(vec![0u8; 256]);
    let after = live();
    drop(sample);
    after > before
}

/// An explicitly scoped measurement: wall-clock time plus memory deltas
/// relative to the moment it started.
///
/// A session must be finished or dropped on the thread that started it.
/// Past [`MAX_OPEN_SESSIONS`] nested sessions, the extra ones fall back to
/// sampling the live count on [`record`](Self::record).
#[derive(Debug)]
pub struct MeasurementSession {
    started: Instant,
    baseline: isize,
    peak: isize,
    slot: Option<usize>,
}

impl MeasurementSession {
    pub fn start() -> Self {
        let now = live();
        let slot = claim_slot(now);
        Self { started: Instant::now(), baseline: now, peak: now, slot }
    }

    /// Restart the clock and the memory baseline.
    pub fn reset(&mut self) {
        let now = live();
        if let Some(slot) = self.slot {
            PEAKS.with(|peaks| peaks[slot].set(now));
        }
        self.started = Instant::now();
        self.baseline = now;
        self.peak = now;
    }

    /// Fold the current live count into this session's peak.
    pub fn record(&mut self) {
        self.peak = self.peak.max(self.tracked_peak()).max(live());
    }

    fn tracked_peak(&self) -> isize {
        self.slot.map_or(self.peak, slot_peak)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn memory_used(&self) -> u64 {
        (live() - self.baseline).max(0) as u64
    }

    pub fn peak_memory(&self) -> u64 {
        (self.peak.max(self.tracked_peak()) - self.baseline).max(0) as u64
    }

    pub fn finish(mut self) -> Measurement {
        self.record();
        Measurement::new(self.elapsed(), self.memory_used(), self.peak_memory())
    }
}

impl Drop for MeasurementSession {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            release_slot(slot);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Seconds.
    pub execution_time: f64,
    pub execution_time_formatted: String,
    pub memory_used: u64,
    pub memory_used_formatted: String,
    pub peak_memory: u64,
    pub peak_memory_formatted: String,
}

impl Measurement {
    pub fn new(elapsed: Duration, memory_used: u64, peak_memory: u64) -> Self {
        let execution_time = elapsed.as_secs_f64();
        Self {
            execution_time,
            execution_time_formatted: format_time(execution_time),
            memory_used,
            memory_used_formatted: format_bytes(memory_used),
            peak_memory,
            peak_memory_formatted: format_bytes(peak_memory),
        }
    }
}

/// `1536` → `"1.5 KB"`. A unit step happens only above 1024.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_decimal(value, 2), UNITS[unit])
}

/// Sub-second times in milliseconds, otherwise seconds.
pub fn format_time(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{} ms", trim_decimal(seconds * 1000.0, 2))
    } else {
        format!("{} s", trim_decimal(seconds, 3))
    }
}

fn trim_decimal(value: f64, places: usize) -> String {
    let text = format!("{:.*}", places, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_step_only_above_1024() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1024 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 1024 * 1024 / 4), "5.25 MB");
    }

    #[test]
    fn times_switch_units_at_one_second() {
        assert_eq!(format_time(0.0125), "12.5 ms");
        assert_eq!(format_time(0.5), "500 ms");
        assert_eq!(format_time(1.23456), "1.235 s");
        assert_eq!(format_time(2.0), "2 s");
    }

    #[test]
    fn slots_are_claimed_and_released() {
        let outer = MeasurementSession::start();
        let inner = MeasurementSession::start();
        assert_eq!(outer.slot, Some(0));
        assert_eq!(inner.slot, Some(1));
        drop(outer);
        let reused = MeasurementSession::start();
        assert_eq!(reused.slot, Some(0));
        drop(inner);
        drop(reused);
        assert_eq!(OPEN.with(Cell::get), 0);
    }

    #[test]
    fn sessions_past_the_limit_still_measure() {
        let held: Vec<_> = (0..MAX_OPEN_SESSIONS).map(|_| MeasurementSession::start()).collect();
        let mut extra = MeasurementSession::start();
        assert_eq!(extra.slot, None);
        extra.record();
        let _ = extra.finish();
        drop(held);
        assert_eq!(OPEN.with(Cell::get), 0);
    }

    #[test]
    fn measurement_formats_its_fields() {
        let m = Measurement::new(Duration::from_millis(250), 2048, 4096);
        assert_eq!(m.execution_time_formatted, "250 ms");
        assert_eq!(m.memory_used_formatted, "2 KB");
        assert_eq!(m.peak_memory_formatted, "4 KB");
    }
}
