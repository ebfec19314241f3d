use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fault reported asynchronously to the exception callback.
///
/// None of these stop the driver; the ingestion thread keeps polling the
/// packet source after reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrCode {
    /// No packet arrived within the receive timeout.
    MsopTimeout,
    /// The packet source failed to deliver a packet.
    InputError,
    /// The capture file was fully replayed and is not set to repeat.
    PcapExit,
}

impl ErrCode {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ErrCode::MsopTimeout)
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrCode::MsopTimeout => write!(f, "Timed out while waiting for a packet"),
            ErrCode::InputError => write!(f, "Failed to receive a packet from the input"),
            ErrCode::PcapExit => write!(f, "Reached the end of the pcap file"),
        }
    }
}
