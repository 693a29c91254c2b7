use chrono::{DateTime, Utc};

use super::ground_station::{GroundStation, EARTH_ROTATION_RAD_S};

pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NadirPoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// Greenwich mean sidereal time in radians.
pub fn gmst(timestamp: DateTime<Utc>) -> f64 {
    sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&timestamp.naive_utc()))
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = [
        vel_teme[0] * cos_gmst + vel_teme[1] * sin_gmst,
        -vel_teme[0] * sin_gmst + vel_teme[1] * cos_gmst,
        vel_teme[2],
    ];
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

pub fn look_angles(station: &GroundStation, sat_ecef: [f64; 3]) -> LookAngles {
    let sta_ecef = station.position_ecef_km();
    let dr = [
        sat_ecef[0] - sta_ecef[0],
        sat_ecef[1] - sta_ecef[1],
        sat_ecef[2] - sta_ecef[2],
    ];
    let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

    let enu = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
    let azimuth_deg = enu.0.atan2(enu.1).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (enu.2 / range_km).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        90.0
    };

    LookAngles {
        azimuth_deg,
        elevation_deg,
        range_km,
    }
}

/// Sub-satellite point on a spherical Earth.
pub fn nadir_point(sat_ecef: [f64; 3]) -> NadirPoint {
    let horizontal = (sat_ecef[0] * sat_ecef[0] + sat_ecef[1] * sat_ecef[1]).sqrt();
    NadirPoint {
        latitude_deg: sat_ecef[2].atan2(horizontal).to_degrees(),
        longitude_deg: sat_ecef[1].atan2(sat_ecef[0]).to_degrees(),
    }
}

/// Great-circle distance (haversine) between two geodetic points, in km.
pub fn ground_distance_km(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2_deg - lon1_deg).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Earth-central half angle of the region from which a satellite at
/// `altitude_km` is seen above `min_elevation_deg`.
pub fn coverage_half_angle_deg(altitude_km: f64, min_elevation_deg: f64) -> f64 {
    let elevation = min_elevation_deg.to_radians();
    let ratio = EARTH_MEAN_RADIUS_KM * elevation.cos() / (EARTH_MEAN_RADIUS_KM + altitude_km);
    (ratio.clamp(-1.0, 1.0).acos() - elevation).to_degrees().max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WGS84_A_KM;
    use approx::assert_relative_eq;

    #[test]
    fn test_zenith_look_angles() {
        let station = GroundStation::default();
        let sat = [WGS84_A_KM + 550.0, 0.0, 0.0];
        let angles = look_angles(&station, sat);
        assert_relative_eq!(angles.elevation_deg, 90.0, epsilon = 1e-6);
        assert_relative_eq!(angles.range_km, 550.0, epsilon = 1e-6);
    }

    #[test]
    fn test_horizon_is_zero_elevation() {
        let station = GroundStation::default();
        // due north, tangent to the surface
        let sat = [WGS84_A_KM, 0.0, 2000.0];
        let angles = look_angles(&station, sat);
        assert_relative_eq!(angles.elevation_deg, 0.0, epsilon = 1e-9);
        assert_relative_eq!(angles.azimuth_deg, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nadir_and_ground_distance() {
        let nadir = nadir_point([0.0, 7000.0, 0.0]);
        assert_relative_eq!(nadir.latitude_deg, 0.0, epsilon = 1e-12);
        assert_relative_eq!(nadir.longitude_deg, 90.0, epsilon = 1e-12);

        let quarter = ground_distance_km(0.0, 0.0, 0.0, 90.0);
        assert_relative_eq!(
            quarter,
            EARTH_MEAN_RADIUS_KM * std::f64::consts::FRAC_PI_2,
            epsilon = 1e-6
        );
        assert_relative_eq!(ground_distance_km(24.9, 121.4, 24.9, 121.4), 0.0);
    }

    #[test]
    fn test_coverage_half_angle_shrinks_with_elevation() {
        let low = coverage_half_angle_deg(550.0, 5.0);
        let high = coverage_half_angle_deg(550.0, 10.0);
        assert!(low > high);
        assert!(high > 14.0 && high < 16.0, "half angle {high}");
        assert!(coverage_half_angle_deg(1200.0, 10.0) > high);
    }

    #[test]
    fn test_ecef_rotation_preserves_norm() {
        let pos = [6000.0, 2000.0, 1500.0];
        let rotated = teme_to_ecef_position(pos, 1.234);
        let norm = |v: [f64; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert_relative_eq!(norm(pos), norm(rotated), epsilon = 1e-9);
    }
}
