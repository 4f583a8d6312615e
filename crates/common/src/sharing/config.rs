use std::time::Duration;

/// Default bound on every relay round trip
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for a `SharingCoordinator`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingConfig {
    /// Applied to each network stage separately
    pub network_timeout: Duration,
    /// Attach an HMAC tag (under a key split off the pairwise key) to
    ///  outgoing records
    pub attach_hmac: bool,
    /// Always fetch the counterparty's current public key before trusting
    ///  a cached pairwise key on send
    pub verify_counterparty_epoch: bool,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            attach_hmac: false,
            verify_counterparty_epoch: false,
        }
    }
}

impl SharingConfig {
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_hmac(mut self, attach: bool) -> Self {
        self.attach_hmac = attach;
        self
    }

    pub fn with_counterparty_epoch_check(mut self, verify: bool) -> Self {
        self.verify_counterparty_epoch = verify;
        self
    }
}
