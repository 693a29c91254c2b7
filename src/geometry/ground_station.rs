use serde::{Deserialize, Serialize};

pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115e-5;
pub const WGS84_A_KM: f64 = 6378.137;
pub const WGS84_E2: f64 = 0.006_694_379_990_14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Default for GroundStation {
    fn default() -> Self {
        Self {
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            altitude_m: 0.0,
        }
    }
}

impl GroundStation {
    pub fn from_coordinates(coordinates: &str, altitude_m: Option<f64>) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() < 2 {
            return None;
        }
        let lat: f64 = parts[0].parse().ok()?;
        let lon: f64 = parts[1].parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
            return None;
        }
        let alt = altitude_m.unwrap_or(0.0);
        Some(Self {
            latitude_deg: lat,
            longitude_deg: lon,
            altitude_m: alt,
        })
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn altitude_km(&self) -> f64 {
        self.altitude_m / 1000.0
    }

    pub fn position_ecef_km(&self) -> [f64; 3] {
        let lat = self.lat_rad();
        let lon = self.lon_rad();
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let sin_lon = lon.sin();
        let cos_lon = lon.cos();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let alt_km = self.altitude_km();
        let x = (n + alt_km) * cos_lat * cos_lon;
        let y = (n + alt_km) * cos_lat * sin_lon;
        let z = (n * (1.0 - WGS84_E2) + alt_km) * sin_lat;
        [x, y, z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_coordinates() {
        let station = GroundStation::from_coordinates("24.9441667, 121.3713889", Some(35.0))
            .expect("valid coordinates");
        assert_relative_eq!(station.latitude_deg, 24.9441667);
        assert_relative_eq!(station.longitude_deg, 121.3713889);
        assert_relative_eq!(station.altitude_m, 35.0);

        assert!(GroundStation::from_coordinates("24.9", None).is_none());
        assert!(GroundStation::from_coordinates("abc, 121.0", None).is_none());
        assert!(GroundStation::from_coordinates("95.0, 121.0", None).is_none());
    }

    #[test]
    fn test_equator_ecef() {
        let station = GroundStation::default();
        let ecef = station.position_ecef_km();
        assert_relative_eq!(ecef[0], WGS84_A_KM, epsilon = 1e-9);
        assert_relative_eq!(ecef[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(ecef[2], 0.0, epsilon = 1e-9);
    }
}
