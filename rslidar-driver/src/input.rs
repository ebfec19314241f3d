//! Packet sources feeding the driver.
//!
//! - [`UdpInput`]: live sensor over the network.
//! - [`PcapInput`]: replay of a capture file (feature `pcap`).
//!
//! Any other source can be plugged in by implementing [`Input`] and passing
//! it to [`crate::LidarDriver::init_with_input`].

use std::time::Duration;

use rslidar_data::RSLIDAR_PKT_LEN;

use crate::config::InputParam;
use crate::error::DriverError;
#[cfg(feature = "pcap")]
pub use crate::pcap_input::PcapInput;
pub use crate::udp_input::UdpInput;

/// Result of one receive attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputState {
    /// A ranging packet was written into the buffer.
    Msop,
    /// A device info packet was written into the buffer.
    Difop,
    /// Nothing arrived before the timeout.
    Timeout,
    /// The source failed.
    Error,
    /// The source has no more packets.
    Exit,
}

pub trait Input: Send {
    /// Blocks for up to `timeout` until the next packet is written to `pkt`.
    fn get_packet(&mut self, pkt: &mut [u8; RSLIDAR_PKT_LEN], timeout: Duration) -> InputState;
}

impl<I: Input + ?Sized> Input for Box<I> {
    fn get_packet(&mut self, pkt: &mut [u8; RSLIDAR_PKT_LEN], timeout: Duration) -> InputState {
        (**self).get_packet(pkt, timeout)
    }
}

/// Opens the source selected by `param.read_pcap`.
pub fn create_input(param: &InputParam) -> Result<Box<dyn Input>, DriverError> {
    if param.read_pcap {
        open_pcap(param)
    } else {
        Ok(Box::new(UdpInput::bind(param)?))
    }
}

#[cfg(feature = "pcap")]
fn open_pcap(param: &InputParam) -> Result<Box<dyn Input>, DriverError> {
    Ok(Box::new(PcapInput::from_file(&param.pcap_file_dir, param)?))
}

#[cfg(not(feature = "pcap"))]
fn open_pcap(_param: &InputParam) -> Result<Box<dyn Input>, DriverError> {
    Err(DriverError::Config(
        "read_pcap requires the \"pcap\" feature".to_string(),
    ))
}
