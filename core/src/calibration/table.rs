use ndarray::Array2;

use crate::calibration::tables;
use crate::prelude::BIN_COUNT;
use crate::telegram::Phase;

/// Laser beam footprint of the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorGeometry {
    pub beam_width_mm: f64,
    pub beam_length_mm: f64,
}

impl SensorGeometry {
    /// Parsivel beam: 180 mm wide, 30 mm long.
    pub const PARSIVEL: SensorGeometry = SensorGeometry {
        beam_width_mm: 180.0,
        beam_length_mm: 30.0,
    };

    /// Collecting area (mm^2) for drops of diameter `diameter_mm`.
    ///
    /// Drops that only partially cross the beam edge are rejected by the
    /// instrument, so the usable length shrinks by half a diameter
    /// (Tokay et al. 2014, eq. 6).
    pub fn effective_area_mm2(&self, diameter_mm: f64) -> f64 {
        self.beam_width_mm * (self.beam_length_mm - diameter_mm / 2.0)
    }
}

/// Immutable lookup data shared by the aggregator and the derivation engine.
///
/// Build it once with [`CalibrationTable::parsivel`] and pass it by reference
/// into both stages.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    pub diameter_mm: [f64; BIN_COUNT],
    pub diameter_ott_mm: [f64; BIN_COUNT],
    pub diameter_width_mm: [f64; BIN_COUNT],
    pub velocity_theoretical: [f64; BIN_COUNT],
    pub velocity_measured: [f64; BIN_COUNT],
    pub velocity_nominal: [f64; BIN_COUNT],
    pub velocity_width: [f64; BIN_COUNT],
    pub velocity_lower: [f64; BIN_COUNT],
    pub velocity_upper: [f64; BIN_COUNT],
    pub geometry: SensorGeometry,
    liquid_mask: Array2<f64>,
    frozen_mask: Array2<f64>,
}

impl CalibrationTable {
    pub fn parsivel() -> Self {
        Self {
            diameter_mm: tables::DIAMETER_MM,
            diameter_ott_mm: tables::DIAMETER_OTT_MM,
            diameter_width_mm: tables::DIAMETER_WIDTH_MM,
            velocity_theoretical: tables::VELOCITY_THEORETICAL_MS,
            velocity_measured: tables::VELOCITY_MEASURED_MS,
            velocity_nominal: tables::VELOCITY_NOMINAL_MS,
            velocity_width: tables::VELOCITY_WIDTH_MS,
            velocity_lower: tables::VELOCITY_LOWER_MS,
            velocity_upper: tables::VELOCITY_UPPER_MS,
            geometry: SensorGeometry::PARSIVEL,
            liquid_mask: mask_from_rows(&tables::LIQUID_MATRIX),
            frozen_mask: mask_from_rows(&tables::FROZEN_MATRIX),
        }
    }

    /// Acceptance mask, indexed `[velocity, diameter]`, for the given phase.
    pub fn mask_for(&self, phase: Phase) -> &Array2<f64> {
        match phase {
            Phase::Liquid => &self.liquid_mask,
            Phase::Frozen => &self.frozen_mask,
        }
    }

    pub fn effective_area_mm2(&self, diameter_bin: usize) -> f64 {
        self.geometry
            .effective_area_mm2(self.diameter_mm[diameter_bin])
    }

    /// Velocity bin whose centre lies closest to the theoretical fall speed of
    /// `diameter_bin`.
    pub fn velocity_bin_for_fall_speed(&self, diameter_bin: usize) -> usize {
        let target = self.velocity_theoretical[diameter_bin];
        let mut best = 0;
        for (idx, &velocity) in self.velocity_measured.iter().enumerate() {
            if (velocity - target).abs() < (self.velocity_measured[best] - target).abs() {
                best = idx;
            }
        }
        best
    }

    /// True when `velocity` lies inside the ±50% band around the theoretical
    /// fall speed for `diameter_bin`.
    pub fn within_tolerance(&self, diameter_bin: usize, velocity: f64) -> bool {
        velocity >= self.velocity_lower[diameter_bin] && velocity <= self.velocity_upper[diameter_bin]
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::parsivel()
    }
}

fn mask_from_rows(rows: &[[u8; BIN_COUNT]; BIN_COUNT]) -> Array2<f64> {
    Array2::from_shape_fn((BIN_COUNT, BIN_COUNT), |(v, d)| f64::from(rows[v][d]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_binary_and_phase_specific() {
        let calib = CalibrationTable::parsivel();
        let liquid = calib.mask_for(Phase::Liquid);
        let frozen = calib.mask_for(Phase::Frozen);
        assert_eq!(liquid.dim(), (32, 32));
        assert!(liquid.iter().chain(frozen.iter()).all(|&v| v == 0.0 || v == 1.0));
        // slow, large particle: snow is accepted, rain is not
        assert_eq!(liquid[[5, 10]], 0.0);
        assert_eq!(frozen[[5, 10]], 1.0);
    }

    #[test]
    fn effective_area_shrinks_with_diameter() {
        let calib = CalibrationTable::parsivel();
        assert_eq!(SensorGeometry::PARSIVEL.effective_area_mm2(0.0), 5400.0);
        assert!(calib.effective_area_mm2(31) < calib.effective_area_mm2(0));
    }

    #[test]
    fn fall_speed_lookup_and_tolerance() {
        let calib = CalibrationTable::parsivel();
        let v = calib.velocity_bin_for_fall_speed(5);
        assert_eq!(v, 16);
        assert!(calib.within_tolerance(5, calib.velocity_measured[v]));
        assert!(!calib.within_tolerance(5, 9.0));
        for d in 0..BIN_COUNT {
            assert!(calib.velocity_lower[d] < calib.velocity_theoretical[d]);
            assert!(calib.velocity_upper[d] > calib.velocity_theoretical[d]);
        }
    }
}
