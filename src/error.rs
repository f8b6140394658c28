/// Errors returned by the transmit controller.
///
/// `R` is the error type of the underlying [Radio](crate::Radio).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<R> {
    /// The frame doesn't fit into the frame buffer. Nothing was written.
    BufferOverflow,
    /// The operation isn't allowed in the current state, like reloading the buffer while a
    /// channel access cycle is running or calling `send` while a send is already underway.
    InvalidState,
    /// The [CsmaConfig](crate::CsmaConfig) can't be used.
    InvalidConfig,
    /// Every channel access attempt of the current link try found the channel busy.
    ///
    /// This is consumed by the link layer retry logic and only counts as one failed link try.
    ChannelAccessExhausted,
    /// The frame went out over the air, but no acknowledgment was received.
    AckMissing,
    /// All link tries failed. The frame was dropped.
    LinkExhausted,
    /// The radio reported a bus error.
    Radio(R),
}

pub type TxResult<T, R> = Result<T, Error<R>>;
