//! Clocks
//!
//! Shard lifecycle decisions (new-node window, min delta, cache TTL) read the
//! wall clock through [`TimeService`] so tests can drive time by hand. Store
//! write timestamps come from [`next_write_timestamp`], a process-wide
//! strictly increasing microsecond counter used for last-write-wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait TimeService: Send + Sync {
    fn current_time_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn current_time_millis(&self) -> u64 {
        system_millis()
    }
}

/// Hand-driven clock.
#[derive(Debug, Default)]
pub struct ManualTimeService {
    now: AtomicU64,
}

impl ManualTimeService {
    pub fn new(now: u64) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) -> u64 {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl TimeService for ManualTimeService {
    fn current_time_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn system_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

static LAST_WRITE_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing write timestamp in microseconds.
pub fn next_write_timestamp() -> u64 {
    let now = system_micros();
    let mut last = LAST_WRITE_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_WRITE_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}
