use core::{future::poll_fn, task::Poll};

use portable_atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use atomic_waker::AtomicWaker;

/// The outcome of a transmission, as reported by the radio interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStatus {
    /// Clear channel assessment found the channel busy. Nothing was transmitted.
    ChannelBusy,
    /// The frame was transmitted, but the ACK is still outstanding.
    Sent,
    /// The frame was transmitted and acknowledged.
    Acked,
    /// The frame was transmitted, but no ACK arrived in time.
    NoAck,
}

/// Handoff between interrupt context and the cooperative context, that owns the transmitter.
///
/// The backoff timer and the radio interrupt only ever touch this. They set a flag or store a
/// status, bump the number of pending events and wake whoever is waiting in [Self::next].
/// Talking to the radio is left to [CsmaTransmitter::process_events](crate::CsmaTransmitter::process_events).
pub struct DeviceEvents {
    waker: AtomicWaker,
    pending_events: AtomicUsize,
    send_due: AtomicBool,
    tx_status: AtomicU8,
}
impl DeviceEvents {
    const NO_STATUS: u8 = 0;
    const CHANNEL_BUSY: u8 = 1;
    const SENT: u8 = 2;
    const ACKED: u8 = 3;
    const NO_ACK: u8 = 4;

    pub const fn new() -> Self {
        Self {
            waker: AtomicWaker::new(),
            pending_events: AtomicUsize::new(0),
            send_due: AtomicBool::new(false),
            tx_status: AtomicU8::new(Self::NO_STATUS),
        }
    }
    /// Mark a send as due and wake the event loop.
    ///
    /// This is the expiry action of the backoff timer and is safe to call from interrupt context.
    pub fn fire_send(&self) {
        critical_section::with(|_| {
            self.send_due.store(true, Ordering::Relaxed);
            self.pending_events.fetch_add(1, Ordering::Relaxed);
        });
        self.waker.wake();
    }
    /// Report the outcome of a transmission.
    ///
    /// This is meant to be called from the radio interrupt handler. If the previous status
    /// wasn't consumed yet, it's overwritten.
    pub fn report_tx_status(&self, tx_status: TxStatus) {
        critical_section::with(|_| {
            self.tx_status.store(
                match tx_status {
                    TxStatus::ChannelBusy => Self::CHANNEL_BUSY,
                    TxStatus::Sent => Self::SENT,
                    TxStatus::Acked => Self::ACKED,
                    TxStatus::NoAck => Self::NO_ACK,
                },
                Ordering::Relaxed,
            );
            self.pending_events.fetch_add(1, Ordering::Relaxed);
        });
        self.waker.wake();
    }
    /// Wake the event loop without posting anything.
    ///
    /// Radio drivers call this, when the radio becomes available again after
    /// [Radio::prepare_transmit](crate::Radio::prepare_transmit) refused a send.
    pub fn notify(&self) {
        critical_section::with(|_| {
            self.pending_events.fetch_add(1, Ordering::Relaxed);
        });
        self.waker.wake();
    }
    /// Check if a send is due.
    pub fn is_send_due(&self) -> bool {
        self.send_due.load(Ordering::Acquire)
    }
    /// Consume the due send, returning whether there was one.
    pub(crate) fn take_send_due(&self) -> bool {
        self.send_due.swap(false, Ordering::AcqRel)
    }
    /// Put back a send, that couldn't be performed.
    ///
    /// Unlike [Self::fire_send], this doesn't generate a new event.
    pub(crate) fn restore_send_due(&self) {
        self.send_due.store(true, Ordering::Release);
    }
    /// Drop a due send, which hasn't been consumed yet.
    ///
    /// Returns `true` if something was cancelled. A backoff timer, which hasn't fired yet, isn't
    /// affected by this.
    pub fn clear_send_due(&self) -> bool {
        let cancelled = self.take_send_due();
        if cancelled {
            trace!("Cancelled pending send.");
        }
        cancelled
    }
    /// Take the last reported transmit status.
    pub(crate) fn take_tx_status(&self) -> Option<TxStatus> {
        match self.tx_status.swap(Self::NO_STATUS, Ordering::AcqRel) {
            Self::CHANNEL_BUSY => Some(TxStatus::ChannelBusy),
            Self::SENT => Some(TxStatus::Sent),
            Self::ACKED => Some(TxStatus::Acked),
            Self::NO_ACK => Some(TxStatus::NoAck),
            _ => None,
        }
    }
    /// The number of events, that haven't been processed yet.
    pub fn pending_events(&self) -> usize {
        self.pending_events.load(Ordering::Relaxed)
    }
    /// Consume one pending event without waiting.
    pub fn try_next(&self) -> bool {
        critical_section::with(|_| {
            let pending_events = self.pending_events.load(Ordering::Relaxed);
            if pending_events == 0 {
                false
            } else {
                self.pending_events
                    .store(pending_events - 1, Ordering::Relaxed);
                true
            }
        })
    }
    /// Asynchronously wait for the next event.
    pub async fn next(&self) {
        poll_fn(|cx| {
            if self.try_next() {
                Poll::Ready(())
            } else {
                self.waker.register(cx.waker());
                // An event may have arrived before the waker was registered.
                if self.try_next() {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
        })
        .await
    }
    /// Forget everything, that is currently pending.
    pub(crate) fn reset(&self) {
        critical_section::with(|_| {
            self.send_due.store(false, Ordering::Relaxed);
            self.tx_status.store(Self::NO_STATUS, Ordering::Relaxed);
            self.pending_events.store(0, Ordering::Relaxed);
        });
    }
}
impl Default for DeviceEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{future::Future, pin::pin};
    use futures_test::task::{new_count_waker, noop_context};

    #[test]
    fn fire_marks_due_and_counts() {
        let events = DeviceEvents::new();
        events.fire_send();
        assert!(events.is_send_due());
        assert_eq!(events.pending_events(), 1);
        assert!(events.try_next());
        assert!(!events.try_next());
    }
    #[test]
    fn clear_is_idempotent() {
        let events = DeviceEvents::new();
        events.fire_send();
        assert!(events.clear_send_due());
        assert!(!events.clear_send_due());
        assert!(!events.is_send_due());
    }
    #[test]
    fn repeated_fires_share_one_due_slot() {
        let events = DeviceEvents::new();
        events.fire_send();
        events.fire_send();
        assert_eq!(events.pending_events(), 2);
        assert!(events.take_send_due());
        assert!(!events.take_send_due());
    }
    #[test]
    fn notify_only_counts() {
        let events = DeviceEvents::new();
        events.notify();
        assert_eq!(events.pending_events(), 1);
        assert!(!events.is_send_due());
        assert_eq!(events.take_tx_status(), None);
    }
    #[test]
    fn latest_tx_status_wins() {
        let events = DeviceEvents::new();
        events.report_tx_status(TxStatus::ChannelBusy);
        events.report_tx_status(TxStatus::Acked);
        assert_eq!(events.take_tx_status(), Some(TxStatus::Acked));
        assert_eq!(events.take_tx_status(), None);
    }
    #[test]
    fn next_wakes_on_fire() {
        let events = DeviceEvents::new();
        let (waker, wake_count) = new_count_waker();
        let mut cx = core::task::Context::from_waker(&waker);

        let mut next = pin!(events.next());
        assert!(next.as_mut().poll(&mut cx).is_pending());
        events.fire_send();
        assert_eq!(wake_count.get(), 1);
        assert!(next.as_mut().poll(&mut cx).is_ready());
        assert_eq!(events.pending_events(), 0);
    }
    #[test]
    fn next_is_ready_with_backlog() {
        let events = DeviceEvents::new();
        events.report_tx_status(TxStatus::Sent);
        let mut cx = noop_context();
        assert!(pin!(events.next()).poll(&mut cx).is_ready());
    }
    #[test]
    fn reset_drops_everything() {
        let events = DeviceEvents::new();
        events.fire_send();
        events.report_tx_status(TxStatus::NoAck);
        events.reset();
        assert!(!events.is_send_due());
        assert_eq!(events.take_tx_status(), None);
        assert_eq!(events.pending_events(), 0);
    }
}
