//! Rain attenuation along the slant path.
//!
//! Specific attenuation follows ITU-R P.838 (`gamma = k * R^alpha`) with the
//! horizontal-polarisation coefficients below, interpolated in log-frequency.
//! The path length below the rain height follows ITU-R P.618 with a
//! horizontal reduction factor that depends on geometry only.

/// (frequency GHz, k, alpha), horizontal polarisation.
const P838_HORIZONTAL: [(f64, f64, f64); 9] = [
    (4.0, 0.000_107_1, 1.6009),
    (6.0, 0.000_705_6, 1.5900),
    (8.0, 0.004_115, 1.3905),
    (10.0, 0.012_17, 1.2571),
    (12.0, 0.023_86, 1.1825),
    (15.0, 0.044_81, 1.1233),
    (20.0, 0.091_64, 1.0568),
    (25.0, 0.157_1, 0.9991),
    (30.0, 0.240_3, 0.9485),
];

/// Effective Earth radius used for low-elevation slant paths, km.
const EFFECTIVE_EARTH_RADIUS_KM: f64 = 8500.0;
const REDUCTION_LENGTH_KM: f64 = 35.0;
const LOW_ELEVATION_DEG: f64 = 5.0;

/// Interpolated `(k, alpha)` for a frequency, clamped to the table range.
pub fn p838_coefficients(frequency_ghz: f64) -> (f64, f64) {
    let first = P838_HORIZONTAL[0];
    let last = P838_HORIZONTAL[P838_HORIZONTAL.len() - 1];
    if frequency_ghz <= first.0 {
        return (first.1, first.2);
    }
    if frequency_ghz >= last.0 {
        return (last.1, last.2);
    }

    for pair in P838_HORIZONTAL.windows(2) {
        let (f0, k0, a0) = pair[0];
        let (f1, k1, a1) = pair[1];
        if frequency_ghz <= f1 {
            let t = (frequency_ghz.ln() - f0.ln()) / (f1.ln() - f0.ln());
            let k = (k0.ln() + t * (k1.ln() - k0.ln())).exp();
            let alpha = a0 + t * (a1 - a0);
            return (k, alpha);
        }
    }
    (last.1, last.2)
}

/// Specific attenuation in dB/km.
pub fn specific_attenuation_db_km(frequency_ghz: f64, rain_rate_mm_h: f64) -> f64 {
    if rain_rate_mm_h <= 0.0 {
        return 0.0;
    }
    let (k, alpha) = p838_coefficients(frequency_ghz);
    k * rain_rate_mm_h.powf(alpha)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainModel {
    pub rain_height_km: f64,
    pub station_altitude_km: f64,
}

impl RainModel {
    pub fn new(rain_height_km: f64, station_altitude_km: f64) -> Self {
        Self {
            rain_height_km,
            station_altitude_km,
        }
    }

    /// Slant path through rain, km. Elevations below the horizon use the
    /// horizontal path.
    pub fn slant_path_km(&self, elevation_deg: f64) -> f64 {
        let dh = self.rain_height_km - self.station_altitude_km;
        if dh <= 0.0 {
            return 0.0;
        }
        let theta = elevation_deg.max(0.0).to_radians();
        if elevation_deg >= LOW_ELEVATION_DEG {
            dh / theta.sin()
        } else {
            let s = theta.sin();
            2.0 * dh / ((s * s + 2.0 * dh / EFFECTIVE_EARTH_RADIUS_KM).sqrt() + s)
        }
    }

    /// Total rain attenuation in dB. Exactly zero when it is not raining.
    pub fn attenuation_db(&self, frequency_ghz: f64, elevation_deg: f64, rain_rate_mm_h: f64) -> f64 {
        if rain_rate_mm_h <= 0.0 {
            return 0.0;
        }
        let slant = self.slant_path_km(elevation_deg);
        if slant <= 0.0 {
            return 0.0;
        }
        let horizontal = slant * elevation_deg.max(0.0).to_radians().cos();
        let reduction = 1.0 / (1.0 + horizontal / REDUCTION_LENGTH_KM);
        specific_attenuation_db_km(frequency_ghz, rain_rate_mm_h) * slant * reduction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_rain_is_exactly_zero() {
        let model = RainModel::new(4.8, 0.035);
        for elevation in [-3.0, 0.0, 5.0, 10.0, 45.0, 90.0] {
            assert_eq!(model.attenuation_db(12.0, elevation, 0.0), 0.0);
        }
    }

    #[test]
    fn test_strictly_increasing_in_rain_rate() {
        let model = RainModel::new(4.8, 0.035);
        for elevation in [2.0, 10.0, 40.0] {
            let mut previous = 0.0;
            for rate in [0.1, 1.0, 5.0, 12.5, 25.0, 50.0, 100.0] {
                let a = model.attenuation_db(12.0, elevation, rate);
                assert!(a > previous, "{a} <= {previous} at {rate} mm/h");
                previous = a;
            }
        }
    }

    #[test]
    fn test_table_points_are_exact() {
        let (k, alpha) = p838_coefficients(12.0);
        assert_relative_eq!(k, 0.02386, max_relative = 1e-12);
        assert_relative_eq!(alpha, 1.1825, max_relative = 1e-12);

        let (k_mid, _) = p838_coefficients(11.0);
        assert!(k_mid > 0.01217 && k_mid < 0.02386);
    }

    #[test]
    fn test_station_above_rain_height() {
        let model = RainModel::new(2.0, 3.0);
        assert_eq!(model.attenuation_db(20.0, 30.0, 50.0), 0.0);
    }

    #[test]
    fn test_lower_elevation_attenuates_more() {
        let model = RainModel::new(4.8, 0.0);
        assert!(model.attenuation_db(20.0, 10.0, 25.0) > model.attenuation_db(20.0, 60.0, 25.0));
    }
}
