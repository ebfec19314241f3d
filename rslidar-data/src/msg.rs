#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Size in bytes of every MSOP and DIFOP packet.
pub const RSLIDAR_PKT_LEN: usize = 1248;

/// One raw MSOP or DIFOP packet.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LidarPacketMsg {
    /// Host receive time in seconds since the Unix epoch.
    pub timestamp: f64,
    #[cfg_attr(feature = "serde", serde(with = "packet_bytes"))]
    packet: Box<[u8; RSLIDAR_PKT_LEN]>,
}

impl LidarPacketMsg {
    pub fn new(packet: &[u8; RSLIDAR_PKT_LEN], timestamp: f64) -> Self {
        LidarPacketMsg {
            timestamp,
            packet: Box::new(*packet),
        }
    }

    pub fn packet(&self) -> &[u8; RSLIDAR_PKT_LEN] {
        &self.packet
    }
}

/// Struct to hold the raw packets of one lap.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LidarScanMsg {
    /// Seconds since the Unix epoch, or lidar clock when enabled.
    pub timestamp: f64,
    pub seq: u32,
    pub parent_frame_id: String,
    pub frame_id: String,
    /// MSOP packets in arrival order.
    pub packets: Vec<LidarPacketMsg>,
}

/// Struct to hold one lap of decoded points.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LidarPointsMsg<P> {
    /// Seconds since the Unix epoch, or lidar clock when enabled.
    pub timestamp: f64,
    pub seq: u32,
    pub parent_frame_id: String,
    pub frame_id: String,
    /// Model string of the sensor, e.g. `RS16`.
    pub lidar_model: String,
    /// Number of rings.
    pub height: u32,
    /// Number of points per ring.
    pub width: u32,
    pub is_dense: bool,
    pub is_transform: bool,
    pub is_motion_correct: bool,
    pub points: Vec<P>,
}

impl<P> Default for LidarPointsMsg<P> {
    fn default() -> Self {
        LidarPointsMsg {
            timestamp: 0.,
            seq: 0,
            parent_frame_id: String::new(),
            frame_id: String::new(),
            lidar_model: String::new(),
            height: 1,
            width: 0,
            is_dense: false,
            is_transform: false,
            is_motion_correct: false,
            points: Vec::new(),
        }
    }
}

#[cfg(feature = "serde")]
mod packet_bytes {
    use super::RSLIDAR_PKT_LEN;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        packet: &[u8; RSLIDAR_PKT_LEN],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(packet)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Box<[u8; RSLIDAR_PKT_LEN]>, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let len = bytes.len();
        bytes
            .into_boxed_slice()
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a 1248 byte packet"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_msg_keeps_bytes() {
        let mut raw = [0u8; RSLIDAR_PKT_LEN];
        raw[0] = 0x55;
        raw[RSLIDAR_PKT_LEN - 1] = 0xAA;
        let msg = LidarPacketMsg::new(&raw, 12.5);
        assert_eq!(msg.packet()[0], 0x55);
        assert_eq!(msg.packet()[RSLIDAR_PKT_LEN - 1], 0xAA);
        assert_eq!(msg.timestamp, 12.5);
    }

    #[test]
    fn test_points_msg_default_flags() {
        let msg = LidarPointsMsg::<crate::PointXYZI>::default();
        assert_eq!(msg.height, 1);
        assert!(!msg.is_dense);
        assert!(!msg.is_transform);
        assert!(!msg.is_motion_correct);
        assert!(msg.points.is_empty());
    }
}
