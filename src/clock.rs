//! Time source for request timestamps and polling delays.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::time::Duration;

/// Supplies wall-clock time and waits.
///
/// Swapping the clock lets the barcode loop run without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current local time, used for the `timestamp` parameter.
    fn now(&self) -> NaiveDateTime;

    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `chrono` and `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
