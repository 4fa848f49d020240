//! Transport trait for application data exchanged over ISO 14443-4

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::Result;

/// Trait for block-oriented card transports
///
/// A transport moves complete application frames to the card and back. It
/// has no knowledge of the command set carried in those frames.
pub trait BlockTransport: fmt::Debug {
    /// Send an application frame and return the card's complete answer
    fn transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        trace!(data = %hex::encode(data), "Transmitting application frame");
        let result = self.do_transceive(data);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received application frame");
            }
            Err(e) => {
                debug!(error = %e, "Transport error during transceive");
            }
        }
        result
    }

    /// Internal implementation of transceive
    /// This is the method that concrete implementations should override
    fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes>;

    /// Largest application payload carried by a single block
    fn max_inf_size(&self) -> usize;

    /// Release the card from layer 4
    fn deselect(&mut self) -> Result<()>;

    /// Release the card and put it into HALT state
    fn halt(&mut self) -> Result<()>;
}

impl<T: BlockTransport + ?Sized> BlockTransport for &mut T {
    fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        (**self).do_transceive(data)
    }

    fn max_inf_size(&self) -> usize {
        (**self).max_inf_size()
    }

    fn deselect(&mut self) -> Result<()> {
        (**self).deselect()
    }

    fn halt(&mut self) -> Result<()> {
        (**self).halt()
    }
}
