//! Randomized exponential backoff.

use embassy_time::Duration;
use rand_core::RngCore;

use crate::{CsmaConfig, DeviceEvents};

/// A reusable one-shot timer, which calls [DeviceEvents::fire_send] once it expires.
///
/// Every transmitter owns exactly one of these and the timer is bound to the transmitter's
/// [DeviceEvents] when it's created, so there is only ever one expiry action per timer.
pub trait BackoffTimer {
    /// Arm the timer to expire after `delay`.
    ///
    /// Arming an already armed timer replaces the previous deadline.
    fn arm(&mut self, delay: Duration);
    /// Disarm the timer, if it hasn't expired yet.
    fn cancel(&mut self);
}

/// The backoff exponent for the given channel access attempt.
pub fn backoff_exponent(config: &CsmaConfig, try_index: u8) -> u8 {
    config
        .min_backoff_exp
        .saturating_add(try_index)
        .min(config.max_backoff_exp)
}

/// The upper bound (exclusive) of the random part of the backoff delay.
pub fn backoff_window(config: &CsmaConfig, try_index: u8) -> Duration {
    let exponent = backoff_exponent(config, try_index);
    let unit = config.backoff_unit.as_ticks();
    let window = match 1u64.checked_shl(exponent as u32) {
        Some(factor) => unit.saturating_mul(factor),
        None if unit == 0 => 0,
        None => u64::MAX,
    };
    Duration::from_ticks(window)
}

/// Draw a uniformly distributed value from `0..bound`.
fn random_below(rng: &mut impl RngCore, bound: u64) -> u64 {
    // Reject the values from the incomplete last stripe, so that there is no modulo bias.
    let zone = u64::MAX - (u64::MAX - bound + 1) % bound;
    loop {
        let value = rng.next_u64();
        if value <= zone {
            return value % bound;
        }
    }
}

/// Schedule the next send attempt.
///
/// If there is neither a backoff window nor an additional delay, the send is triggered right
/// away. Otherwise the timer is armed for a random delay from the backoff window plus the
/// `additional_delay`.
/// Returns the delay, the timer was armed with.
pub fn schedule_attempt(
    config: &CsmaConfig,
    try_index: u8,
    additional_delay: Duration,
    timer: &mut impl BackoffTimer,
    rng: &mut impl RngCore,
    events: &DeviceEvents,
) -> Option<Duration> {
    let window = backoff_window(config, try_index);
    if window.as_ticks() == 0 && additional_delay.as_ticks() == 0 {
        trace!("No backoff for attempt {}, sending immediately.", try_index);
        events.fire_send();
        return None;
    }
    let backoff = if window.as_ticks() == 0 {
        0
    } else {
        random_below(rng, window.as_ticks())
    };
    let delay = Duration::from_ticks(backoff.saturating_add(additional_delay.as_ticks()));
    trace!(
        "Backing off for {} us before attempt {}.",
        delay.as_micros(),
        try_index
    );
    timer.arm(delay);
    Some(delay)
}
