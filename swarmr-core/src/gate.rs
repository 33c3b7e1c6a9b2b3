use std::sync::atomic::{AtomicU64, Ordering};

/// Shared request budget for request-count bounded runs.
///
/// Every worker takes a permit before sending; once the budget is spent no permit is handed
/// out again, so the run issues exactly `limit` requests.
#[derive(Debug)]
pub struct RequestGate {
    counter: AtomicU64,
    limit: Option<u64>,
}

impl RequestGate {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn try_acquire(&self) -> bool {
        let Some(total) = self.limit else {
            return true;
        };

        // Never advance past the limit so `issued` stays exact.
        self.counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < total).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}
