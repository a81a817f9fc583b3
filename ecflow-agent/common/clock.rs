use std::time::Duration;

/// Source of blocking waits used for retry and settle delays
///
/// Waits block the calling thread and cannot be cancelled: a power
/// transition must run every handler's write and settle to completion.
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real timed wait on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
