//! # `csma-link`
//! This is a channel access and link layer retry controller for packet radio transceivers.
//! It decides when the one frame a radio driver has queued may be transmitted on a shared medium,
//! and how to recover from a busy channel or a missing acknowledgment. The radio itself, the
//! timer and the random number generator are supplied by the user.
//! ## Overview
//! This chapter will give a short overview of how a frame makes its way through the controller.
//!
//! ### Channel access (CSMA/CA)
//! Before a frame is transmitted, we wait for a random number of backoff periods. The window
//! this is drawn from starts at `2^min_backoff_exp` periods and doubles for every attempt, that
//! found the channel busy, until it reaches `2^max_backoff_exp`. Once the backoff timer expires,
//! the frame is handed to the radio, which performs a clear channel assessment and transmits it,
//! if the channel is free. If the channel stays busy for `max_channel_tries` attempts in a row,
//! the channel access cycle is considered exhausted.
//!
//! ### Link layer retries (ARQ)
//! One channel access cycle, followed by waiting for the ACK, makes up a link try. If the ACK
//! doesn't arrive, or channel access was exhausted, a new link try is started after a fixed
//! delay. Once all link tries are used up, the frame is dropped and a single failure is
//! reported.
//!
//! ### Interrupt context
//! Neither the backoff timer, nor the radio interrupt ever talk to the radio. They only post to
//! [DeviceEvents], by setting a flag or storing a [TxStatus], incrementing the number of
//! pending events and waking the task, that owns the [CsmaTransmitter]. That task then calls
//! [CsmaTransmitter::process_events] or awaits [CsmaTransmitter::next_event], which is where
//! the radio is actually accessed. A send, that became due but wasn't performed yet, can still
//! be dropped with [CsmaTransmitter::clear_pending]. A timer, that hasn't expired yet, is not
//! affected by this.

#![cfg_attr(not(test), no_std)]
#[macro_use]
mod fmt;

mod backoff;
mod buffer;
mod config;
mod csma;
mod error;
mod radio;
mod sync;
mod timer;

pub use backoff::{backoff_exponent, backoff_window, BackoffTimer};
pub use buffer::{FrameBuffer, MAX_FRAME_SIZE};
pub use config::CsmaConfig;
pub use csma::*;
pub use error::{Error, TxResult};
pub use radio::Radio;
pub use sync::{DeviceEvents, TxStatus};
pub use timer::EmbassyBackoffTimer;

#[cfg(not(feature = "critical_section"))]
type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(feature = "critical_section")]
type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
