/// The transmit path of a radio chip.
///
/// These are only ever called from [CsmaTransmitter::process_events](crate::CsmaTransmitter::process_events)
/// and friends, never from interrupt context, so implementations may freely use the bus.
/// The outcome of a transmission is reported later through
/// [DeviceEvents::report_tx_status](crate::DeviceEvents::report_tx_status).
pub trait Radio {
    type Error;

    /// Get the radio ready for transmission.
    ///
    /// Returns `false`, if the radio can't transmit right now, for example because it is in the
    /// middle of receiving a frame.
    fn prepare_transmit(&mut self) -> Result<bool, Self::Error>;
    /// Copy `data` into the transmit FIFO of the radio, starting at `offset`.
    fn load_tx_buffer(&mut self, data: &[u8], offset: usize) -> Result<(), Self::Error>;
    /// Start the transmission of the loaded frame, including clear channel assessment.
    fn trigger_transmit(&mut self) -> Result<(), Self::Error>;
}
