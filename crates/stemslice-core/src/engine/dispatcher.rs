use std::ops::Range;
use std::sync::{Mutex, PoisonError};

/// Issues disjoint, increasing ranges of probe indices to worker threads.
///
/// The cursor lock is held only while the next range is computed.
#[derive(Debug)]
pub struct WorkDispatcher {
    cursor: Mutex<usize>,
    total: usize,
}

impl WorkDispatcher {
    pub fn new(total: usize) -> Self {
        Self {
            cursor: Mutex::new(0),
            total,
        }
    }

    /// Claims the next `min(batch, remaining)` probes, or `None` once every
    /// probe has been handed out. A zero batch request is treated as one.
    pub fn get_work(&self, batch: usize) -> Option<Range<usize>> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if *cursor >= self.total {
            return None;
        }
        let start = *cursor;
        let stop = (start + batch.max(1)).min(self.total);
        *cursor = stop;
        Some(start..stop)
    }
}
