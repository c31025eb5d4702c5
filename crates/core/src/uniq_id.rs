//! Process-unique identifiers for games and players.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of unique string identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Base-36 millisecond timestamps, strictly increasing.
///
/// When the clock has not moved past the last issued value (several ids
/// in one millisecond, or the clock stepping backwards), the last value
/// is bumped by one instead.
pub struct MonotonicIdGenerator {
    last: AtomicU64,
    clock: Clock,
}

impl MonotonicIdGenerator {
    pub fn new() -> Self {
        Self::with_clock(Box::new(now_millis))
    }

    pub fn with_clock(clock: Clock) -> Self {
        let start = clock();
        Self {
            last: AtomicU64::new(start),
            clock,
        }
    }

    /// Shared process-wide generator.
    pub fn global() -> &'static MonotonicIdGenerator {
        static GLOBAL: OnceLock<MonotonicIdGenerator> = OnceLock::new();
        GLOBAL.get_or_init(MonotonicIdGenerator::new)
    }

    fn next_value(&self) -> u64 {
        let now = (self.clock)();
        let mut issued = 0;
        let _ = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                issued = if now > last { now } else { last + 1 };
                Some(issued)
            });
        issued
    }
}

impl Default for MonotonicIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for MonotonicIdGenerator {
    fn next_id(&self) -> String {
        to_base36(self.next_value())
    }
}

/// Handle to [`MonotonicIdGenerator::global`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalIdGenerator;

impl IdGenerator for GlobalIdGenerator {
    fn next_id(&self) -> String {
        MonotonicIdGenerator::global().next_id()
    }
}

/// Deterministic `prefix1`, `prefix2`, ... ids for tests and demos.
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        format!("{}{}", self.prefix, self.next.fetch_add(1, Ordering::Relaxed))
    }
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_owned();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();

    String::from_utf8_lossy(&digits).into_owned()
}
