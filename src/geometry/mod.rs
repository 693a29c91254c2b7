mod frames;
mod ground_station;

pub use frames::*;
pub use ground_station::{GroundStation, EARTH_ROTATION_RAD_S, WGS84_A_KM, WGS84_E2};
