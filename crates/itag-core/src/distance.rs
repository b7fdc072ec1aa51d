//! Distance estimation from averaged signal strength.
//!
//! Converts a smoothed RSSI reading into meters using a two-branch
//! power model fitted empirically against iTag hardware. The alarm
//! range thresholds are tuned against this exact curve, so the
//! constants and branch condition must not be "corrected" toward a
//! textbook path-loss formula.

/// Reference signal strength at one meter, in dBm.
pub const DEFAULT_TX_POWER: f64 = -60.0;

/// Sentinel distance for an invalid or absent signal.
pub const UNKNOWN_DISTANCE: f64 = -1.0;

/// Estimator with a fixed calibration constant.
#[derive(Debug, Clone, Copy)]
pub struct DistanceEstimator {
    tx_power: f64,
}

impl DistanceEstimator {
    /// Create an estimator calibrated to the given 1 m reference RSSI.
    #[must_use]
    pub fn new(tx_power: f64) -> Self {
        Self { tx_power }
    }

    /// The calibration constant in use.
    #[must_use]
    pub fn tx_power(&self) -> f64 {
        self.tx_power
    }

    /// Estimate distance in meters from an averaged RSSI.
    ///
    /// Returns [`UNKNOWN_DISTANCE`] when the average is exactly zero,
    /// which only happens when no signal was measured.
    #[must_use]
    pub fn estimate(&self, average_signal: f64) -> f64 {
        if average_signal == 0.0 {
            return UNKNOWN_DISTANCE;
        }

        let ratio = average_signal / self.tx_power;
        if ratio < 1.0 {
            ratio.powi(10)
        } else {
            0.89976 * ratio.powf(7.7095) + 0.111
        }
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_TX_POWER)
    }
}

/// Round half-away-from-zero at the given decimal count.
///
/// Used at the event boundary where distance is surfaced to observers;
/// the estimator itself stays full-precision.
#[must_use]
pub fn round_to_places(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
