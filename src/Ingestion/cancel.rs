use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Broadcast cancellation shared by the engine and its workers.
///
/// Clones observe the same flag. Each `start` of the engine hands out a fresh
/// token, so a stopped generation of workers never sees a later restart.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
