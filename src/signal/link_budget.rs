use serde::{Deserialize, Serialize};

use super::rain::RainModel;
use crate::config::LinkConfig;

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
const THERMAL_NOISE_DBM_HZ: f64 = -174.0;
const SUBCARRIERS_PER_RB: f64 = 12.0;

pub fn free_space_path_loss_db(range_km: f64, frequency_ghz: f64) -> f64 {
    20.0 * range_km.log10() + 20.0 * frequency_ghz.log10() + 92.45
}

/// Received-frequency offset for a transmitter moving at `range_rate_km_s`
/// (positive when receding).
pub fn doppler_shift_hz(frequency_hz: f64, range_rate_km_s: f64) -> f64 {
    -frequency_hz * range_rate_km_s / SPEED_OF_LIGHT_KM_S
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSample {
    pub fspl_db: f64,
    pub atmospheric_loss_db: f64,
    pub free_space_power_dbm: f64,
    pub received_power_dbm: f64,
    pub rsrp_dbm: f64,
    pub sinr_db: f64,
}

#[derive(Debug, Clone)]
pub struct LinkBudget {
    link: LinkConfig,
    rain: Option<RainModel>,
    rain_rate_mm_h: f64,
}

impl LinkBudget {
    /// `rain: None` drops the atmospheric term entirely.
    pub fn new(link: LinkConfig, rain: Option<RainModel>, rain_rate_mm_h: f64) -> Self {
        Self {
            link,
            rain,
            rain_rate_mm_h,
        }
    }

    pub fn frequency_hz(&self) -> f64 {
        self.link.frequency_ghz * 1e9
    }

    fn noise_floor_dbm(&self) -> f64 {
        THERMAL_NOISE_DBM_HZ
            + 10.0 * (self.link.bandwidth_mhz * 1e6).log10()
            + self.link.noise_figure_db
    }

    pub fn evaluate(&self, range_km: f64, elevation_deg: f64) -> LinkSample {
        let fspl_db = free_space_path_loss_db(range_km, self.link.frequency_ghz);
        let free_space_power_dbm = self.link.eirp_dbw + 30.0 + self.link.rx_gain_dbi - fspl_db;
        let atmospheric_loss_db = match &self.rain {
            Some(rain) => {
                rain.attenuation_db(self.link.frequency_ghz, elevation_deg, self.rain_rate_mm_h)
            }
            None => 0.0,
        };
        let received_power_dbm = free_space_power_dbm - atmospheric_loss_db;
        let rsrp_dbm =
            received_power_dbm - 10.0 * (SUBCARRIERS_PER_RB * self.link.resource_blocks as f64).log10();

        LinkSample {
            fspl_db,
            atmospheric_loss_db,
            free_space_power_dbm,
            received_power_dbm,
            rsrp_dbm,
            sinr_db: received_power_dbm - self.noise_floor_dbm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fspl_reference_value() {
        // 1000 km at 10 GHz
        assert_relative_eq!(free_space_path_loss_db(1000.0, 10.0), 172.45, epsilon = 1e-9);
    }

    #[test]
    fn test_budget_chain() {
        let link = LinkConfig::default();
        let budget = LinkBudget::new(link.clone(), None, 0.0);
        let sample = budget.evaluate(800.0, 40.0);

        let expected_fspl = free_space_path_loss_db(800.0, link.frequency_ghz);
        assert_relative_eq!(sample.fspl_db, expected_fspl);
        assert_eq!(sample.atmospheric_loss_db, 0.0);
        assert_relative_eq!(
            sample.free_space_power_dbm,
            link.eirp_dbw + 30.0 + link.rx_gain_dbi - expected_fspl
        );
        assert_relative_eq!(
            sample.rsrp_dbm,
            sample.received_power_dbm - 10.0 * 1200f64.log10(),
            epsilon = 1e-9
        );
        assert!(sample.rsrp_dbm < sample.received_power_dbm);
    }

    #[test]
    fn test_rain_lowers_received_power() {
        let rain = RainModel::new(4.8, 0.0);
        let dry = LinkBudget::new(LinkConfig::default(), Some(rain), 0.0).evaluate(900.0, 20.0);
        let wet = LinkBudget::new(LinkConfig::default(), Some(rain), 20.0).evaluate(900.0, 20.0);

        assert_eq!(dry.received_power_dbm, dry.free_space_power_dbm);
        assert!(wet.received_power_dbm < dry.received_power_dbm);
        assert_eq!(wet.free_space_power_dbm, dry.free_space_power_dbm);
    }

    #[test]
    fn test_doppler_sign() {
        assert!(doppler_shift_hz(12e9, -6.0) > 0.0);
        assert!(doppler_shift_hz(12e9, 6.0) < 0.0);
    }
}
