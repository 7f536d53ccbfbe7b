//! Motion configuration shared between command handlers and status
//! publishing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BridgeError;
use crate::geometry::{Quaternion, Vec3};

/// Gait selection hint forwarded to the robot's locomotion controller.
///
/// Discriminants match the robot API's numeric encoding so raw values coming
/// in from the middleware can be validated with [`TryFrom<u32>`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocomotionHint {
    Unknown = 0,
    #[default]
    Auto = 1,
    Trot = 2,
    SpeedSelectTrot = 3,
    Crawl = 4,
    Amble = 5,
    SpeedSelectAmble = 6,
    Jog = 7,
    Hop = 8,
    AutoTrot = 9,
    AutoAmble = 10,
    SpeedSelectCrawl = 11,
}

impl TryFrom<u32> for LocomotionHint {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use LocomotionHint::*;
        Ok(match value {
            0 => Unknown,
            1 => Auto,
            2 => Trot,
            3 => SpeedSelectTrot,
            4 => Crawl,
            5 => Amble,
            6 => SpeedSelectAmble,
            7 => Jog,
            8 => Hop,
            9 => AutoTrot,
            10 => AutoAmble,
            11 => SpeedSelectCrawl,
            other => {
                return Err(BridgeError::Validation(format!(
                    "unknown locomotion mode {other}"
                )));
            }
        })
    }
}

/// Planar velocity ceiling applied to velocity and trajectory commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityLimit {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

/// Body pose offset relative to the footprint: height plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyOffset {
    pub position: Vec3,
    pub orientation: Quaternion,
}

/// Mobility parameters shared by every motion command.
///
/// There is exactly one live instance per bridge; it is only ever changed by
/// copying, editing the targeted fields and writing the whole value back.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MobilityConfig {
    pub stair_hint: bool,
    pub locomotion_hint: LocomotionHint,
    /// `None` leaves the robot's built-in limit in place.
    pub velocity_limit: Option<VelocityLimit>,
    pub body_offset: BodyOffset,
}

/// Which odometry source becomes the parent of the body frame.
///
/// Parsing accepts exactly the literals `"odom"` and `"vision"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OdomFrameMode {
    /// Kinematic (leg) odometry.
    #[default]
    Odom,
    /// Fused visual-kinematic odometry.
    Vision,
}

impl fmt::Display for OdomFrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdomFrameMode::Odom => write!(f, "odom"),
            OdomFrameMode::Vision => write!(f, "vision"),
        }
    }
}

impl FromStr for OdomFrameMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "odom" => Ok(OdomFrameMode::Odom),
            "vision" => Ok(OdomFrameMode::Vision),
            other => Err(BridgeError::Config(format!(
                "mode_parent_odom_tf should be 'odom' or 'vision', got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locomotion_hint_accepts_known_values() {
        assert_eq!(LocomotionHint::try_from(2).unwrap(), LocomotionHint::Trot);
        assert_eq!(
            LocomotionHint::try_from(11).unwrap(),
            LocomotionHint::SpeedSelectCrawl
        );
    }

    #[test]
    fn locomotion_hint_rejects_unknown_values() {
        let err = LocomotionHint::try_from(42).unwrap_err();
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn odom_mode_parses_only_exact_literals() {
        assert_eq!("odom".parse::<OdomFrameMode>().unwrap(), OdomFrameMode::Odom);
        assert_eq!("vision".parse::<OdomFrameMode>().unwrap(), OdomFrameMode::Vision);
        assert!("Vision".parse::<OdomFrameMode>().is_err());
        assert!("gps".parse::<OdomFrameMode>().is_err());
        assert!("".parse::<OdomFrameMode>().is_err());
    }

    #[test]
    fn default_mobility_config_has_no_velocity_limit() {
        let cfg = MobilityConfig::default();
        assert!(!cfg.stair_hint);
        assert_eq!(cfg.locomotion_hint, LocomotionHint::Auto);
        assert!(cfg.velocity_limit.is_none());
        assert_eq!(cfg.body_offset.orientation, Quaternion::identity());
    }
}
