use embassy_time::Duration;

/// Parameters of the channel access and link retry logic.
///
/// The defaults are the unslotted CSMA-CA values of IEEE 802.15.4 for the 2.4 GHz O-QPSK PHY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CsmaConfig {
    /// The backoff exponent used for the first channel access attempt. (`macMinBE`)
    pub min_backoff_exp: u8,
    /// The upper bound of the backoff exponent. (`macMaxBE`)
    pub max_backoff_exp: u8,
    /// How many channel access attempts are made for a single link try.
    pub max_channel_tries: u8,
    /// The length of one backoff period. (`aUnitBackoffPeriod`)
    ///
    /// Setting this to zero disables the random backoff entirely.
    pub backoff_unit: Duration,
    /// How many link tries are made, if `0` is passed to
    /// [CsmaTransmitter::send](crate::CsmaTransmitter::send).
    pub default_max_link_tries: u8,
    /// The extra delay inserted before every retransmission.
    pub link_retry_delay: Duration,
}
impl CsmaConfig {
    pub const DEFAULT_MIN_BACKOFF_EXP: u8 = 3;
    pub const DEFAULT_MAX_BACKOFF_EXP: u8 = 5;
    pub const DEFAULT_MAX_CHANNEL_TRIES: u8 = 5;
    pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_micros(320);
    pub const DEFAULT_MAX_LINK_TRIES: u8 = 4;
    pub const DEFAULT_LINK_RETRY_DELAY: Duration = Duration::from_micros(864);
    /// Beyond this the backoff window no longer fits into 64 bits of ticks.
    const BACKOFF_EXP_LIMIT: u8 = 32;

    /// Check that the transmitter can operate with these parameters.
    pub const fn is_valid(&self) -> bool {
        self.max_channel_tries != 0
            && self.default_max_link_tries != 0
            && self.min_backoff_exp <= self.max_backoff_exp
            && self.max_backoff_exp < Self::BACKOFF_EXP_LIMIT
    }
}
impl Default for CsmaConfig {
    fn default() -> Self {
        Self {
            min_backoff_exp: Self::DEFAULT_MIN_BACKOFF_EXP,
            max_backoff_exp: Self::DEFAULT_MAX_BACKOFF_EXP,
            max_channel_tries: Self::DEFAULT_MAX_CHANNEL_TRIES,
            backoff_unit: Self::DEFAULT_BACKOFF_UNIT,
            default_max_link_tries: Self::DEFAULT_MAX_LINK_TRIES,
            link_retry_delay: Self::DEFAULT_LINK_RETRY_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(CsmaConfig::default().is_valid());
    }
    #[test]
    fn rejects_empty_budgets() {
        let config = CsmaConfig {
            max_channel_tries: 0,
            ..Default::default()
        };
        assert!(!config.is_valid());
        let config = CsmaConfig {
            default_max_link_tries: 0,
            ..Default::default()
        };
        assert!(!config.is_valid());
    }
    #[test]
    fn rejects_bad_exponents() {
        let config = CsmaConfig {
            min_backoff_exp: 6,
            max_backoff_exp: 5,
            ..Default::default()
        };
        assert!(!config.is_valid());
        let config = CsmaConfig {
            max_backoff_exp: 32,
            ..Default::default()
        };
        assert!(!config.is_valid());
    }
}
