use std::fmt;
use std::path::Path;
use std::time::Duration;

use rslidar_data::LidarType;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// How the decoder decides that a lap is complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SplitFrameModeRepr", into = "u16")]
pub enum SplitFrameMode {
    /// Split when the azimuth crosses `cut_angle`.
    #[default]
    CutAngle,
    /// Split after the number of packets one rotation produces at the
    /// sensor's nominal packet rate.
    PacketRate,
    /// Split after `num_pkts_split` packets.
    FixedPackets,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SplitFrameModeRepr {
    Number(u16),
    Name(String),
}

impl TryFrom<SplitFrameModeRepr> for SplitFrameMode {
    type Error = String;

    fn try_from(repr: SplitFrameModeRepr) -> Result<Self, Self::Error> {
        match repr {
            SplitFrameModeRepr::Number(1) => Ok(SplitFrameMode::CutAngle),
            SplitFrameModeRepr::Number(2) => Ok(SplitFrameMode::PacketRate),
            SplitFrameModeRepr::Number(3) => Ok(SplitFrameMode::FixedPackets),
            SplitFrameModeRepr::Number(n) => Err(format!("unknown split frame mode {}", n)),
            SplitFrameModeRepr::Name(name) => match name.as_str() {
                "cut_angle" => Ok(SplitFrameMode::CutAngle),
                "packet_rate" => Ok(SplitFrameMode::PacketRate),
                "fixed_packets" => Ok(SplitFrameMode::FixedPackets),
                _ => Err(format!("unknown split frame mode \"{}\"", name)),
            },
        }
    }
}

impl From<SplitFrameMode> for u16 {
    fn from(mode: SplitFrameMode) -> u16 {
        match mode {
            SplitFrameMode::CutAngle => 1,
            SplitFrameMode::PacketRate => 2,
            SplitFrameMode::FixedPackets => 3,
        }
    }
}

/// Parameters handed to the decoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParam {
    /// Points farther than this (meters) are dropped.
    pub max_distance: f32,
    /// Points closer than this (meters) are dropped.
    pub min_distance: f32,
    /// Start of the kept azimuth range, in degrees.
    pub start_angle: f32,
    /// End of the kept azimuth range, in degrees.
    pub end_angle: f32,
    pub mode_split_frame: SplitFrameMode,
    /// Packets per frame, only used with [`SplitFrameMode::FixedPackets`].
    pub num_pkts_split: u32,
    /// Azimuth of the frame split, only used with [`SplitFrameMode::CutAngle`].
    pub cut_angle: f32,
}

impl Default for DecoderParam {
    fn default() -> Self {
        DecoderParam {
            max_distance: 200.,
            min_distance: 0.2,
            start_angle: 0.,
            end_angle: 360.,
            mode_split_frame: SplitFrameMode::CutAngle,
            num_pkts_split: 0,
            cut_angle: 0.,
        }
    }
}

impl DecoderParam {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.min_distance < 0. || self.min_distance > self.max_distance {
            return Err(DriverError::Config(format!(
                "distance range [{}, {}] is invalid",
                self.min_distance, self.max_distance
            )));
        }
        for (name, angle) in [
            ("start_angle", self.start_angle),
            ("end_angle", self.end_angle),
            ("cut_angle", self.cut_angle),
        ] {
            if !(0. ..=360.).contains(&angle) {
                return Err(DriverError::Config(format!(
                    "{} must be within [0, 360], got {}",
                    name, angle
                )));
            }
        }
        if self.mode_split_frame == SplitFrameMode::FixedPackets && self.num_pkts_split == 0 {
            return Err(DriverError::Config(
                "num_pkts_split must be positive when splitting by packet count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the packet source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputParam {
    /// Sender address of the lidar. `0.0.0.0` accepts packets from any host.
    pub device_ip: String,
    pub msop_port: u16,
    pub difop_port: u16,
    /// Replay `pcap_file_dir` instead of listening on the network.
    pub read_pcap: bool,
    /// Rewind the capture when it ends.
    pub pcap_repeat: bool,
    pub pcap_file_dir: String,
}

impl Default for InputParam {
    fn default() -> Self {
        InputParam {
            device_ip: "192.168.1.200".to_string(),
            msop_port: 6699,
            difop_port: 7788,
            read_pcap: false,
            pcap_repeat: false,
            pcap_file_dir: "null".to_string(),
        }
    }
}

/// Top level driver configuration.
///
/// Every field has a default, so a TOML file only needs the keys that
/// differ:
///
/// ```toml
/// device_type = "RS32"
/// use_lidar_clock = true
///
/// [input_param]
/// read_pcap = true
/// pcap_file_dir = "/data/rs32.pcap"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParam {
    /// Angle calibration file. Empty for models that report it over DIFOP.
    pub calib_path: String,
    pub frame_id: String,
    pub device_type: String,
    /// Stamp messages with the lidar clock instead of the host clock.
    pub use_lidar_clock: bool,
    /// Receive timeout in milliseconds.
    pub timeout: u32,
    pub input_param: InputParam,
    pub decoder_param: DecoderParam,
}

impl Default for DriverParam {
    fn default() -> Self {
        DriverParam {
            calib_path: String::new(),
            frame_id: "rslidar_points".to_string(),
            device_type: "RS16".to_string(),
            use_lidar_clock: false,
            timeout: 100,
            input_param: InputParam::default(),
            decoder_param: DecoderParam::default(),
        }
    }
}

impl DriverParam {
    pub fn from_toml_str(s: &str) -> Result<DriverParam, DriverError> {
        toml::from_str(s).map_err(|e| DriverError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DriverParam, DriverError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn lidar_type(&self) -> Result<LidarType, DriverError> {
        self.device_type
            .parse()
            .map_err(|_| DriverError::UnsupportedLidarType(self.device_type.clone()))
    }

    /// Rejects parameters the driver cannot run with.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.timeout == 0 {
            return Err(DriverError::Config(
                "timeout must be at least 1 ms".to_string(),
            ));
        }
        self.decoder_param.validate()
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.into())
    }
}

impl fmt::Display for DriverParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "device_type: {}, frame_id: {}, calib_path: \"{}\", use_lidar_clock: {}, timeout: {} ms",
            self.device_type, self.frame_id, self.calib_path, self.use_lidar_clock, self.timeout
        )?;
        let input = &self.input_param;
        if input.read_pcap {
            write!(
                f,
                ", pcap: {} (repeat: {})",
                input.pcap_file_dir, input.pcap_repeat
            )?;
        } else {
            write!(
                f,
                ", device_ip: {}, msop_port: {}, difop_port: {}",
                input.device_ip, input.msop_port, input.difop_port
            )?;
        }
        let decoder = &self.decoder_param;
        write!(
            f,
            ", distance: [{}, {}] m, angle: [{}, {}] deg, split: {:?}",
            decoder.min_distance,
            decoder.max_distance,
            decoder.start_angle,
            decoder.end_angle,
            decoder.mode_split_frame
        )
    }
}
