use std::collections::VecDeque;

use csma_link::{
    BackoffTimer, CsmaConfig, CsmaTransmitter, DeviceEvents, Error, Probe, Radio, TxEvent,
    TxStatus,
};
use embassy_time::Duration;
use futures_test::test;
use rand::{rngs::SmallRng, SeedableRng};

macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// Pretends to be a radio, whose interrupt reports the scripted outcome of every transmission.
struct ScriptedRadio<'a> {
    events: &'a DeviceEvents,
    script: VecDeque<TxStatus>,
    transmitted: Vec<Vec<u8>>,
    pending: Vec<u8>,
}
impl<'a> ScriptedRadio<'a> {
    fn new(events: &'a DeviceEvents, script: impl IntoIterator<Item = TxStatus>) -> Self {
        Self {
            events,
            script: script.into_iter().collect(),
            transmitted: Vec::new(),
            pending: Vec::new(),
        }
    }
}
impl Radio for ScriptedRadio<'_> {
    type Error = ();
    fn prepare_transmit(&mut self) -> Result<bool, ()> {
        Ok(true)
    }
    fn load_tx_buffer(&mut self, data: &[u8], offset: usize) -> Result<(), ()> {
        self.pending.truncate(offset);
        self.pending.extend_from_slice(data);
        Ok(())
    }
    fn trigger_transmit(&mut self) -> Result<(), ()> {
        self.transmitted.push(self.pending.clone());
        let status = self.script.pop_front().unwrap_or(TxStatus::NoAck);
        self.events.report_tx_status(status);
        Ok(())
    }
}

#[derive(Default)]
struct CountingTimer {
    armed: Option<Duration>,
    arm_count: usize,
}
impl BackoffTimer for CountingTimer {
    fn arm(&mut self, delay: Duration) {
        self.armed = Some(delay);
        self.arm_count += 1;
    }
    fn cancel(&mut self) {
        self.armed = None;
    }
}

/// No backoff and no retry delay, so every attempt is triggered right away.
fn immediate_config() -> CsmaConfig {
    CsmaConfig {
        backoff_unit: Duration::from_ticks(0),
        link_retry_delay: Duration::from_ticks(0),
        ..Default::default()
    }
}

#[test]
async fn delivered_on_first_try() {
    let events: &'static DeviceEvents = mk_static!(DeviceEvents, DeviceEvents::new());
    let radio = ScriptedRadio::new(events, [TxStatus::Acked]);
    let mut tx: CsmaTransmitter<'_, _, _, _> = CsmaTransmitter::new(
        radio,
        CountingTimer::default(),
        SmallRng::seed_from_u64(1),
        events,
        immediate_config(),
    )
    .unwrap();
    tx.load(&[0x41, 0x88, 0x01], 0).unwrap();
    tx.load(&[0xaa, 0xbb], 3).unwrap();
    tx.send(0).unwrap();

    assert_eq!(tx.next_event().await, TxEvent::Delivered);
    assert_eq!(tx.radio().transmitted, [vec![0x41u8, 0x88, 0x01, 0xaa, 0xbb]]);
    assert_eq!(tx.timer().arm_count, 0);
    assert_eq!(tx.stats().delivered, 1);
}

#[test]
async fn retransmits_after_missing_ack() {
    let events = DeviceEvents::new();
    let radio = ScriptedRadio::new(
        &events,
        [TxStatus::NoAck, TxStatus::ChannelBusy, TxStatus::Acked],
    );
    let mut tx: CsmaTransmitter<'_, _, _, _> = CsmaTransmitter::new(
        radio,
        CountingTimer::default(),
        SmallRng::seed_from_u64(2),
        &events,
        immediate_config(),
    )
    .unwrap();
    tx.load(&[1, 2, 3], 0).unwrap();
    tx.send(0).unwrap();

    assert_eq!(
        tx.next_event().await,
        TxEvent::LinkRetry(Error::AckMissing)
    );
    assert_eq!(tx.next_event().await, TxEvent::Delivered);
    assert_eq!(tx.radio().transmitted.len(), 3);
    assert_eq!(tx.stats().link_retries, 1);
    assert_eq!(tx.stats().channel_busy, 1);
}

// Scenario C: every link try runs out of channel access attempts.
#[test]
async fn gives_up_after_all_link_tries() {
    let events = DeviceEvents::new();
    let config = immediate_config();
    let tries = config.max_channel_tries as usize * config.default_max_link_tries as usize;
    let radio = ScriptedRadio::new(&events, core::iter::repeat(TxStatus::ChannelBusy).take(tries));
    let mut tx: CsmaTransmitter<'_, _, _, _> = CsmaTransmitter::new(
        radio,
        CountingTimer::default(),
        SmallRng::seed_from_u64(3),
        &events,
        config,
    )
    .unwrap();
    tx.send(0).unwrap();

    for _ in 1..config.default_max_link_tries {
        assert_eq!(
            tx.next_event().await,
            TxEvent::LinkRetry(Error::ChannelAccessExhausted)
        );
    }
    assert_eq!(
        tx.next_event().await,
        TxEvent::Failed(Error::LinkExhausted)
    );
    assert!(!tx.is_link_send_active());
    assert_eq!(tx.radio().transmitted.len(), tries);
    assert_eq!(tx.stats().failed, 1);
    assert!(!events.is_send_due());
}

// Scenario A: the frame goes out and the ACK is still outstanding.
#[test]
async fn channel_access_success_awaits_ack() {
    let events = DeviceEvents::new();
    let radio = ScriptedRadio::new(&events, [TxStatus::Sent]);
    let mut tx: CsmaTransmitter<'_, _, _, _> = CsmaTransmitter::new(
        radio,
        CountingTimer::default(),
        SmallRng::seed_from_u64(4),
        &events,
        CsmaConfig::default(),
    )
    .unwrap();
    tx.send(0).unwrap();
    let backoff = tx.timer().armed.unwrap();
    assert!(backoff < CsmaConfig::DEFAULT_BACKOFF_UNIT * 8);

    // The timer expires.
    tx.timer_mut().armed = None;
    events.fire_send();
    assert_eq!(tx.probe_and_send_if_pending(), Ok(Probe::Transmitting));
    assert_eq!(tx.process_events(), None);

    assert!(!tx.is_channel_cycle_active());
    assert!(tx.is_link_send_active());
    assert_eq!(tx.timer().arm_count, 1);
    assert_eq!(tx.timer().armed, None);
}

// Scenario B: channel access is exhausted and the caller records the failed link try.
#[test]
async fn exhausted_channel_access_consumes_one_link_try() {
    let events = DeviceEvents::new();
    let radio = ScriptedRadio::new(&events, Vec::new());
    let mut tx: CsmaTransmitter<'_, _, _, _> = CsmaTransmitter::new(
        radio,
        CountingTimer::default(),
        SmallRng::seed_from_u64(5),
        &events,
        CsmaConfig::default(),
    )
    .unwrap();
    tx.send(3).unwrap();

    for _ in 0..4 {
        assert_eq!(tx.channel_access_failed(), Ok(()));
        assert!(tx.is_channel_cycle_active());
    }
    assert_eq!(
        tx.channel_access_failed(),
        Err(Error::ChannelAccessExhausted)
    );
    assert!(!tx.is_channel_cycle_active());
    assert_eq!(tx.timer().arm_count, 5);

    assert_eq!(tx.link_failed(), Ok(()));
    assert_eq!(tx.link_tries_left(), 2);
    assert!(tx.is_channel_cycle_active());
    let delay = tx.timer().armed.unwrap();
    assert!(delay >= CsmaConfig::DEFAULT_LINK_RETRY_DELAY);
    assert!(delay < CsmaConfig::DEFAULT_LINK_RETRY_DELAY + CsmaConfig::DEFAULT_BACKOFF_UNIT * 8);
}
