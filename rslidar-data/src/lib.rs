pub mod error_code;
pub mod lidar_type;
pub mod msg;
pub mod point;

pub use error_code::ErrCode;
pub use lidar_type::{LidarType, ParseLidarTypeError};
pub use msg::{LidarPacketMsg, LidarPointsMsg, LidarScanMsg, RSLIDAR_PKT_LEN};
pub use point::PointXYZI;
