//! Cancellable one-shot timers that report back into the event loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One named timer. Arming again cancels the pending expiry; every expiry
/// carries the generation it was armed with so late deliveries are ignored.
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    generation: u64,
    pending: Option<CancellationToken>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            pending: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Schedule `make(generation)` to be sent on `tx` after `delay`.
    /// Must be called inside a tokio runtime.
    pub fn arm<E, F>(&mut self, delay: Duration, tx: &mpsc::UnboundedSender<E>, make: F) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = tx.clone();
        let name = self.name;
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if tx.send(make(generation)).is_err() {
                        tracing::trace!(timer = name, "event loop gone, expiry dropped");
                    }
                }
            }
        });
        self.pending = Some(token);
        generation
    }

    /// Arm only when nothing is pending. Returns whether it armed.
    pub fn arm_if_idle<E, F>(&mut self, delay: Duration, tx: &mpsc::UnboundedSender<E>, make: F) -> bool
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        if self.is_armed() {
            return false;
        }
        let _ = self.arm(delay, tx, make);
        true
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    /// Accept an expiry. `false` means it is stale and must be ignored.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
