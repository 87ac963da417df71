use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Epoch-millisecond clock for population samples.
///
/// Never hands out the same or an earlier value twice, even when passes run
/// back to back within one millisecond or the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct SampleClock {
    last: AtomicI64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}
