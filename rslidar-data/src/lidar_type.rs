use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Supported RoboSense models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LidarType {
    RS16,
    RS32,
    RSBP,
    RS128,
}

impl LidarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LidarType::RS16 => "RS16",
            LidarType::RS32 => "RS32",
            LidarType::RSBP => "RSBP",
            LidarType::RS128 => "RS128",
        }
    }
}

impl fmt::Display for LidarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseLidarTypeError(pub String);

impl fmt::Display for ParseLidarTypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\" is not a supported lidar type", self.0)
    }
}

impl Error for ParseLidarTypeError {}

impl FromStr for LidarType {
    type Err = ParseLidarTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RS16" => Ok(LidarType::RS16),
            "RS32" => Ok(LidarType::RS32),
            "RSBP" => Ok(LidarType::RSBP),
            "RS128" => Ok(LidarType::RS128),
            _ => Err(ParseLidarTypeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lidar_type() {
        assert_eq!("RS16".parse::<LidarType>(), Ok(LidarType::RS16));
        assert_eq!("rs32".parse::<LidarType>(), Ok(LidarType::RS32));
        assert_eq!(" RSBP ".parse::<LidarType>(), Ok(LidarType::RSBP));
        assert_eq!("RS128".parse::<LidarType>(), Ok(LidarType::RS128));
        assert!("RS48".parse::<LidarType>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for t in [
            LidarType::RS16,
            LidarType::RS32,
            LidarType::RSBP,
            LidarType::RS128,
        ] {
            assert_eq!(t.to_string().parse::<LidarType>(), Ok(t));
        }
    }
}
