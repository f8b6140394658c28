use embassy_futures::select::{select, Either};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::{BackoffTimer, DefaultRawMutex, DeviceEvents};

/// A [BackoffTimer] backed by `embassy-time`.
///
/// Arming and cancelling only post a command. The actual waiting happens in [Self::run], which
/// has to be spawned as a task, that lives as long as the transmitter. Enable the
/// `critical_section` feature, if that task runs on a different executor than the transmitter.
pub struct EmbassyBackoffTimer {
    command: Signal<DefaultRawMutex, Option<Duration>>,
}
impl EmbassyBackoffTimer {
    pub const fn new() -> Self {
        Self {
            command: Signal::new(),
        }
    }
    /// Run the timer, firing `events` every time it expires.
    ///
    /// This never returns.
    pub async fn run(&self, events: &DeviceEvents) {
        loop {
            let mut command = self.command.wait().await;
            while let Some(delay) = command {
                match select(Timer::after(delay), self.command.wait()).await {
                    Either::First(()) => {
                        trace!("Backoff timer expired.");
                        events.fire_send();
                        command = None;
                    }
                    // Re-armed or cancelled, before we expired.
                    Either::Second(next) => command = next,
                }
            }
        }
    }
}
impl Default for EmbassyBackoffTimer {
    fn default() -> Self {
        Self::new()
    }
}
impl BackoffTimer for &EmbassyBackoffTimer {
    fn arm(&mut self, delay: Duration) {
        self.command.signal(Some(delay));
    }
    fn cancel(&mut self) {
        self.command.signal(None);
    }
}
