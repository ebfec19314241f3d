#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cartesian point with return strength.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointXYZI {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
}
