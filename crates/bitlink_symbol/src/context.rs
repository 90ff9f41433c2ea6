use core::fmt::{Display, Formatter, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of an execution context.
///
/// Ids are handed out from a process-wide counter and never reused, so a stale id
/// can never compare equal to a context created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ContextId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "ctx#{}", self.0)
    }
}
