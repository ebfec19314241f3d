use std::path::Path;

use rslidar_data::LidarType;

use crate::config::DecoderParam;
use crate::error::DriverError;

/// Outcome of decoding one MSOP packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Points belong to the frame in progress.
    Ok,
    /// Points complete the frame in progress.
    FrameSplit,
    /// The packet was rejected and contributes no points.
    Error,
}

/// Sensor specific packet decoding.
///
/// The driver serializes every call, ranging and info alike, so an
/// implementation can update its calibration in [`Decoder::decode_difop`]
/// without further locking.
pub trait Decoder: Send + 'static {
    type Point: Clone + Send + Sync + 'static;

    fn new(lidar_type: LidarType, param: &DecoderParam) -> Result<Self, DriverError>
    where
        Self: Sized;

    /// Loads an angle calibration file.
    fn load_calibration(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Decodes one MSOP packet, appending its points to `points`.
    fn decode_msop(&mut self, pkt: &[u8], points: &mut Vec<Self::Point>) -> DecodeStatus;

    /// Updates calibration and device status from one DIFOP packet.
    fn decode_difop(&mut self, pkt: &[u8]);

    /// Lidar clock of a packet, in seconds.
    fn lidar_time(&self, pkt: &[u8]) -> f64;

    /// Number of rings in a decoded frame.
    fn height(&self) -> u32 {
        1
    }
}
