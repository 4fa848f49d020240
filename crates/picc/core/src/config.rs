//! Configuration options for the type A protocol layers

use std::time::Duration;

/// Configuration options shared by selection and the ISO 14443-4 transport
///
/// The bounded counters are protocol limits: every loop that waits on the
/// card gives up after the configured number of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Iterations allowed per cascade level of the anti-collision loop
    pub anticollision_iterations: usize,

    /// Frames exchanged while the card keeps asking for waiting time
    pub wtx_retries: usize,

    /// Resends of one I-block the card acknowledged with the wrong block number
    pub retransmissions: usize,

    /// Frame waiting time in timer ticks used until the card announces its own
    pub default_fwt: u32,

    /// Unit of the start-up frame guard time
    pub guard_time_unit: Duration,

    /// Largest frame the reader chip buffers, in bytes
    pub max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            anticollision_iterations: 32,
            wtx_retries: 24,
            retransmissions: 24,
            default_fwt: 256,
            guard_time_unit: Duration::from_micros(302),
            max_frame_size: 64,
        }
    }
}

impl ProtocolConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the anti-collision iteration limit
    pub const fn with_anticollision_iterations(mut self, iterations: usize) -> Self {
        self.anticollision_iterations = iterations;
        self
    }

    /// Set the waiting time extension retry limit
    pub const fn with_wtx_retries(mut self, retries: usize) -> Self {
        self.wtx_retries = retries;
        self
    }

    /// Set the I-block retransmission limit
    pub const fn with_retransmissions(mut self, retransmissions: usize) -> Self {
        self.retransmissions = retransmissions;
        self
    }

    /// Set the default frame waiting time
    pub const fn with_default_fwt(mut self, ticks: u32) -> Self {
        self.default_fwt = ticks;
        self
    }

    /// Set the frame guard time unit
    pub const fn with_guard_time_unit(mut self, unit: Duration) -> Self {
        self.guard_time_unit = unit;
        self
    }

    /// Set the reader frame buffer size
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}
