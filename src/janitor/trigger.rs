//! Coalescing request for an out-of-schedule sweep.

use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable handle that asks the janitor to sweep soon. Requests made
/// while a sweep is pending collapse into one.
#[derive(Debug, Clone, Default)]
pub struct SweepTrigger {
    notify: Arc<Notify>,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Guard that requests a sweep when dropped, however the owning
    /// operation ends.
    pub fn on_drop(&self) -> SweepOnDrop {
        SweepOnDrop {
            trigger: self.clone(),
        }
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }
}

#[derive(Debug)]
pub struct SweepOnDrop {
    trigger: SweepTrigger,
}

impl Drop for SweepOnDrop {
    fn drop(&mut self) {
        self.trigger.request();
    }
}
