use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::warn;

use crate::{Error, Result};

/// Granularity with which [`CancellationToken::sleep`] notices a cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared flag that is raised once by the interrupt handler and checked at every blocking wait.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let until = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }

    /// Cancels this token on the first Ctrl-C and exits the process on the second one.
    pub fn install_interrupt_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                std::process::exit(130);
            }
            warn!("Interrupted, stopping at the next wait. Press Ctrl-C again to exit immediately.");
            token.cancel();
        })
    }
}
