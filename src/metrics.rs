use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility. Never behavioral.
#[derive(Clone, Default)]
pub struct Counters {
    pub picks_created: Arc<AtomicU64>,
    pub singles_created: Arc<AtomicU64>,
    pub batches_created: Arc<AtomicU64>,
    pub carts_created: Arc<AtomicU64>,

    // skip reasons
    pub orders_unavailable: Arc<AtomicU64>,
    pub records_undecodable: Arc<AtomicU64>,
    pub picks_failed: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &Arc<AtomicU64>) {
        counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}
