use embassy_time::Duration;
use rand_core::RngCore;

use crate::{
    backoff::schedule_attempt,
    buffer::{FrameBuffer, MAX_FRAME_SIZE},
    BackoffTimer, CsmaConfig, DeviceEvents, Error, Radio, TxResult, TxStatus,
};

/// Where the transmitter is in the life cycle of a send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    /// No send is underway.
    #[default]
    Idle,
    /// A channel access cycle for the current link try is running.
    ChannelAccess,
    /// The channel access cycle is over and the link try awaits its outcome.
    ///
    /// This is either the ACK (or lack thereof) for a transmitted frame, or the caller
    /// recording the failed link try after channel access was exhausted.
    LinkPending,
}

/// The result of [CsmaTransmitter::probe_and_send_if_pending].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Probe {
    /// No send was due.
    NothingPending,
    /// The frame was handed to the radio for transmission.
    Transmitting,
    /// The radio can't transmit right now. The send stays due and no channel access try was
    /// consumed. The radio driver is expected to call [DeviceEvents::notify] once it's ready.
    RadioBusy,
}

/// Something the owner of the frame should know about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxEvent<E> {
    /// The frame was acknowledged.
    Delivered,
    /// A link try failed for the contained reason and the frame will be retransmitted.
    LinkRetry(Error<E>),
    /// The frame was dropped.
    Failed(Error<E>),
}
impl<E> TxEvent<E> {
    /// Returns `true`, if this concludes the send.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::LinkRetry(_))
    }
}

/// Counters, that are kept across sends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStats {
    /// Frames, that were acknowledged.
    pub delivered: u32,
    /// Frames, that were dropped after running out of link tries.
    pub failed: u32,
    /// Clear channel assessments, that found the channel busy.
    pub channel_busy: u32,
    /// Link tries, that failed and were retried.
    pub link_retries: u32,
}

/// Channel access and link layer retry controller for one radio.
///
/// This owns the frame being transmitted and decides when it may go on air. A send runs
/// through two nested retry budgets: each link try consists of up to
/// [CsmaConfig::max_channel_tries] channel access attempts separated by a random exponential
/// backoff, and a send consists of up to `max_link_tries` link tries, separated by
/// [CsmaConfig::link_retry_delay].
///
/// The backoff timer and the radio interrupt never call into this directly. They post to the
/// shared [DeviceEvents], and the owner calls [Self::process_events] (or awaits
/// [Self::next_event]) from a context where talking to the radio is fine.
pub struct CsmaTransmitter<
    'ev,
    R: Radio,
    T: BackoffTimer,
    G: RngCore,
    const N: usize = MAX_FRAME_SIZE,
> {
    radio: R,
    timer: T,
    rng: G,
    events: &'ev DeviceEvents,
    config: CsmaConfig,
    buffer: FrameBuffer<N>,
    state: TxState,
    channel_tries_left: u8,
    link_tries_left: u8,
    stats: TxStats,
}
impl<'ev, R: Radio, T: BackoffTimer, G: RngCore, const N: usize> CsmaTransmitter<'ev, R, T, G, N> {
    /// Create a new transmitter.
    ///
    /// `timer` must call [DeviceEvents::fire_send] on `events`, when it expires.
    pub fn new(
        radio: R,
        timer: T,
        rng: G,
        events: &'ev DeviceEvents,
        config: CsmaConfig,
    ) -> TxResult<Self, R::Error> {
        if !config.is_valid() {
            error!("Invalid CSMA configuration.");
            return Err(Error::InvalidConfig);
        }
        trace!(
            "Initializing transmitter with a {} byte frame buffer.",
            N
        );
        Ok(Self {
            radio,
            timer,
            rng,
            events,
            config,
            buffer: FrameBuffer::new(),
            state: TxState::Idle,
            channel_tries_left: 0,
            link_tries_left: 0,
            stats: TxStats::default(),
        })
    }
    /// Copy `frame` into the frame buffer at `offset`.
    ///
    /// The frame length becomes `offset + frame.len()`. This fails with
    /// [Error::BufferOverflow] if that exceeds the capacity, in which case the buffer stays
    /// untouched, and with [Error::InvalidState] while a channel access cycle is running.
    pub fn load(&mut self, frame: &[u8], offset: usize) -> TxResult<(), R::Error> {
        if self.state == TxState::ChannelAccess {
            warn!("Attempted to reload the frame buffer during channel access.");
            return Err(Error::InvalidState);
        }
        if !self.buffer.write(frame, offset) {
            debug!(
                "Frame of {} bytes at offset {} doesn't fit into the frame buffer.",
                frame.len(),
                offset
            );
            return Err(Error::BufferOverflow);
        }
        trace!("Loaded {} bytes at offset {}.", frame.len(), offset);
        Ok(())
    }
    /// Start sending the loaded frame.
    ///
    /// If `max_link_tries` is zero, [CsmaConfig::default_max_link_tries] is used. The outcome is
    /// reported later through [Self::process_events].
    pub fn send(&mut self, max_link_tries: u8) -> TxResult<(), R::Error> {
        if self.is_link_send_active() {
            warn!("Attempted to send, while a send is already underway.");
            return Err(Error::InvalidState);
        }
        self.link_tries_left = if max_link_tries == 0 {
            self.config.default_max_link_tries
        } else {
            max_link_tries
        };
        debug!(
            "Sending {} byte frame with {} link tries.",
            self.buffer.len(),
            self.link_tries_left
        );
        self.state = TxState::LinkPending;
        self.start_channel_cycle(Duration::from_ticks(0))
    }
    /// Start a new channel access cycle for the current link try.
    fn start_channel_cycle(&mut self, additional_delay: Duration) -> TxResult<(), R::Error> {
        if self.state == TxState::ChannelAccess {
            warn!("Attempted to start channel access, while it's already running.");
            return Err(Error::InvalidState);
        }
        self.channel_tries_left = self.config.max_channel_tries;
        self.state = TxState::ChannelAccess;
        self.events.clear_send_due();
        self.schedule_attempt(0, additional_delay);
        Ok(())
    }
    fn schedule_attempt(&mut self, try_index: u8, additional_delay: Duration) {
        schedule_attempt(
            &self.config,
            try_index,
            additional_delay,
            &mut self.timer,
            &mut self.rng,
            self.events,
        );
    }
    /// Transmit the frame, if the backoff for the current attempt has elapsed.
    ///
    /// Must not be called from interrupt context. If the radio reports a bus error, the due send
    /// is consumed and the error is returned.
    pub fn probe_and_send_if_pending(&mut self) -> TxResult<Probe, R::Error> {
        if !self.events.take_send_due() {
            return Ok(Probe::NothingPending);
        }
        if self.state != TxState::ChannelAccess {
            trace!("Dropping stale send in state {:?}.", self.state);
            return Ok(Probe::NothingPending);
        }
        if !self.radio.prepare_transmit().map_err(Error::Radio)? {
            trace!("Radio is busy, deferring send.");
            self.events.restore_send_due();
            return Ok(Probe::RadioBusy);
        }
        self.radio
            .load_tx_buffer(self.buffer.as_slice(), 0)
            .map_err(Error::Radio)?;
        self.radio.trigger_transmit().map_err(Error::Radio)?;
        trace!(
            "Transmitting frame, {} channel access tries left.",
            self.channel_tries_left
        );
        Ok(Probe::Transmitting)
    }
    /// Drop a send, that is due but wasn't performed yet.
    ///
    /// Returns `true`, if something was cancelled. An armed backoff timer isn't affected.
    pub fn clear_pending(&mut self) -> bool {
        self.events.clear_send_due()
    }
    /// The frame went on air.
    ///
    /// This ends the channel access cycle. The link try now waits for the ACK.
    pub fn channel_access_succeeded(&mut self) -> TxResult<(), R::Error> {
        if self.state != TxState::ChannelAccess {
            warn!("Channel access succeeded outside of a channel access cycle.");
            return Err(Error::InvalidState);
        }
        self.state = TxState::LinkPending;
        self.channel_tries_left = self.config.max_channel_tries;
        trace!("Channel access succeeded.");
        Ok(())
    }
    /// The channel access attempt failed.
    ///
    /// Schedules the next attempt with a longer backoff window. After
    /// [CsmaConfig::max_channel_tries] failures in a row, the cycle ends and
    /// [Error::ChannelAccessExhausted] is returned. The caller then has to record the failed link
    /// try with [Self::link_failed].
    pub fn channel_access_failed(&mut self) -> TxResult<(), R::Error> {
        if self.state != TxState::ChannelAccess {
            warn!("Channel access failed outside of a channel access cycle.");
            return Err(Error::InvalidState);
        }
        self.channel_tries_left = self.channel_tries_left.saturating_sub(1);
        if self.channel_tries_left == 0 {
            debug!("Channel access exhausted.");
            self.state = TxState::LinkPending;
            return Err(Error::ChannelAccessExhausted);
        }
        let try_index = self.config.max_channel_tries - self.channel_tries_left;
        debug!(
            "Channel access failed, retrying. {} tries left.",
            self.channel_tries_left
        );
        self.schedule_attempt(try_index, Duration::from_ticks(0));
        Ok(())
    }
    /// The frame was acknowledged. This concludes the send.
    pub fn link_succeeded(&mut self) -> TxResult<(), R::Error> {
        if self.state != TxState::LinkPending {
            warn!("Link succeeded in state {:?}.", self.state);
            return Err(Error::InvalidState);
        }
        self.state = TxState::Idle;
        self.link_tries_left = 0;
        self.stats.delivered = self.stats.delivered.wrapping_add(1);
        info!("Frame delivered.");
        Ok(())
    }
    /// The link try failed.
    ///
    /// If there are link tries left, a new channel access cycle is started after
    /// [CsmaConfig::link_retry_delay]. Otherwise the send is over and [Error::LinkExhausted] is
    /// returned.
    pub fn link_failed(&mut self) -> TxResult<(), R::Error> {
        if self.state != TxState::LinkPending {
            warn!("Link failed in state {:?}.", self.state);
            return Err(Error::InvalidState);
        }
        self.link_tries_left = self.link_tries_left.saturating_sub(1);
        if self.link_tries_left == 0 {
            self.state = TxState::Idle;
            self.stats.failed = self.stats.failed.wrapping_add(1);
            error!("Link tries exhausted, dropping frame.");
            return Err(Error::LinkExhausted);
        }
        self.stats.link_retries = self.stats.link_retries.wrapping_add(1);
        debug!(
            "Link try failed, retransmitting. {} tries left.",
            self.link_tries_left
        );
        self.start_channel_cycle(self.config.link_retry_delay)
    }
    fn fail_link_try(&mut self, cause: Error<R::Error>) -> Option<TxEvent<R::Error>> {
        match self.link_failed() {
            Ok(()) => Some(TxEvent::LinkRetry(cause)),
            Err(err @ Error::LinkExhausted) => Some(TxEvent::Failed(err)),
            Err(_) => {
                trace!("Ignoring failed link try in state {:?}.", self.state);
                None
            }
        }
    }
    fn fail_channel_access(&mut self) -> Option<TxEvent<R::Error>> {
        match self.channel_access_failed() {
            Err(err @ Error::ChannelAccessExhausted) => self.fail_link_try(err),
            _ => None,
        }
    }
    /// Apply a transmit status reported by the radio.
    ///
    /// Exhausting channel access is recorded as a failed link try right away.
    pub fn handle_tx_status(&mut self, tx_status: TxStatus) -> Option<TxEvent<R::Error>> {
        trace!("Handling TX status {:?} in state {:?}.", tx_status, self.state);
        match tx_status {
            TxStatus::ChannelBusy => {
                self.stats.channel_busy = self.stats.channel_busy.wrapping_add(1);
                self.fail_channel_access()
            }
            TxStatus::Sent => {
                self.complete_channel_access(tx_status);
                None
            }
            TxStatus::Acked => {
                if self.state == TxState::ChannelAccess {
                    self.complete_channel_access(tx_status);
                }
                match self.link_succeeded() {
                    Ok(()) => Some(TxEvent::Delivered),
                    Err(_) => {
                        trace!("Ignoring late ACK.");
                        None
                    }
                }
            }
            TxStatus::NoAck => {
                if self.state == TxState::ChannelAccess {
                    self.complete_channel_access(tx_status);
                }
                self.fail_link_try(Error::AckMissing)
            }
        }
    }
    fn complete_channel_access(&mut self, tx_status: TxStatus) {
        match self.channel_access_succeeded() {
            Ok(()) => {}
            Err(_) => trace!(
                "Ignoring TX status {:?} in state {:?}.",
                tx_status,
                self.state
            ),
        }
    }
    /// Process whatever the timer and the radio interrupt posted.
    ///
    /// A reported transmit status is applied first, then a due send is performed. A radio error
    /// during the send counts as a failed channel access attempt.
    ///
    /// At most one event is returned. If applying the status already produced one, a due send
    /// is left alone and performed by the next call. This doesn't consume a pending event from
    /// [DeviceEvents], so it can also be used for polling.
    pub fn process_events(&mut self) -> Option<TxEvent<R::Error>> {
        let status_event = self
            .events
            .take_tx_status()
            .and_then(|tx_status| self.handle_tx_status(tx_status));
        if status_event.is_some() {
            return status_event;
        }
        match self.probe_and_send_if_pending() {
            Ok(_) => None,
            Err(_) => {
                warn!("Radio error while sending, counting it as failed channel access.");
                self.fail_channel_access()
            }
        }
    }
    /// Wait until the send concludes or a link try fails.
    ///
    /// Every pending event from [DeviceEvents] is consumed and followed by a call to
    /// [Self::process_events], until that produces an event. Awaiting this again after a
    /// [TxEvent::LinkRetry] follows the retransmission.
    pub async fn next_event(&mut self) -> TxEvent<R::Error> {
        loop {
            self.events.next().await;
            if let Some(event) = self.process_events() {
                return event;
            }
        }
    }
    /// Return to idle, abandoning the current send.
    ///
    /// The armed backoff timer is cancelled and anything pending is dropped. The loaded frame
    /// is kept.
    pub fn reset(&mut self) {
        debug!("Resetting transmitter in state {:?}.", self.state);
        self.timer.cancel();
        self.events.reset();
        self.state = TxState::Idle;
        self.channel_tries_left = 0;
        self.link_tries_left = 0;
    }
    /// Where the current send is.
    pub fn state(&self) -> TxState {
        self.state
    }
    /// Returns `true` while a channel access cycle is running.
    pub fn is_channel_cycle_active(&self) -> bool {
        self.state == TxState::ChannelAccess
    }
    /// Returns `true` while a send is underway.
    pub fn is_link_send_active(&self) -> bool {
        self.state != TxState::Idle
    }
    /// Channel access attempts left in the current cycle.
    pub fn channel_tries_left(&self) -> u8 {
        self.channel_tries_left
    }
    /// Link tries left for the current send.
    pub fn link_tries_left(&self) -> u8 {
        self.link_tries_left
    }
    /// The currently loaded frame.
    pub fn frame(&self) -> &[u8] {
        self.buffer.as_slice()
    }
    /// The configuration passed to [Self::new].
    pub fn config(&self) -> &CsmaConfig {
        &self.config
    }
    /// Counters for all sends since creation or the last [Self::reset_stats].
    pub fn stats(&self) -> TxStats {
        self.stats
    }
    /// Zero all counters.
    pub fn reset_stats(&mut self) {
        self.stats = TxStats::default();
    }
    /// Get a reference to the radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }
    /// Get a reference to the backoff timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
