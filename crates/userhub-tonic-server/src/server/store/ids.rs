use portable_atomic::{AtomicU64, Ordering};

/// Hands out `<prefix><n>` identifiers from a shared counter starting at 1.
///
/// `fetch_add` makes allocation wait-free, so concurrent callers always
/// observe distinct values without taking the store lock.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: &'static str,
    next: AtomicU64,
}

impl SequentialIds {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}
