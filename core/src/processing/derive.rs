use std::f64::consts::PI;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;

use crate::calibration::CalibrationTable;
use crate::prelude::{
    DurationPolicy, PipelineConfig, PipelineError, PipelineResult, ProcessingStage, BIN_COUNT,
    MISSING,
};
use crate::processing::aggregate::AggregatedInterval;
use crate::telemetry::log::LogManager;

/// Density of liquid water in g/mm^3.
pub const WATER_DENSITY_G_MM3: f64 = 1.0e-3;

/// Converts a product in mm^2 * m to m^3.
const MM2_M_TO_M3: f64 = 1.0e-6;

pub const MOMENT_ORDERS: usize = 8;

/// A derived quantity as an interval total plus its contribution from each
/// diameter bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinSeries {
    pub total: f64,
    pub per_bin: [f64; BIN_COUNT],
}

impl BinSeries {
    /// Series whose total is the plain sum of its bins.
    pub fn summed(per_bin: [f64; BIN_COUNT]) -> Self {
        Self {
            total: per_bin.iter().sum(),
            per_bin,
        }
    }

    pub fn missing() -> Self {
        Self {
            total: MISSING,
            per_bin: [MISSING; BIN_COUNT],
        }
    }
}

/// Drop-size distribution and precipitation statistics for one interval.
///
/// Units: density m^-3 mm^-1, concentration m^-3, LWC g m^-3,
/// reflectivity mm^6 m^-3, rain rate mm h^-1, accumulation mm, diameters mm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DsdRecord {
    pub start: NaiveDateTime,
    pub drop_count: f64,
    /// N(D); the total is the number concentration sum of N(D) dD.
    pub density: BinSeries,
    pub concentration: BinSeries,
    pub lwc: BinSeries,
    pub reflectivity: BinSeries,
    pub dbz: f64,
    pub rain_rate: BinSeries,
    pub accumulation: BinSeries,
    pub dmax: f64,
    /// Mass-weighted mean diameter.
    pub dm: f64,
    /// Standard deviation of the mass spectrum about `dm`.
    pub sigma_m: f64,
    pub moments: [f64; MOMENT_ORDERS],
}

impl DsdRecord {
    pub fn missing(start: NaiveDateTime) -> Self {
        Self {
            start,
            drop_count: MISSING,
            density: BinSeries::missing(),
            concentration: BinSeries::missing(),
            lwc: BinSeries::missing(),
            reflectivity: BinSeries::missing(),
            dbz: MISSING,
            rain_rate: BinSeries::missing(),
            accumulation: BinSeries::missing(),
            dmax: MISSING,
            dm: MISSING,
            sigma_m: MISSING,
            moments: [MISSING; MOMENT_ORDERS],
        }
    }

    pub fn is_missing(&self) -> bool {
        self.drop_count.is_nan()
    }
}

/// Sampling time actually behind an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EffectiveDuration {
    minutes: f64,
    nominal_minutes: f64,
}

impl EffectiveDuration {
    fn for_interval(interval: &AggregatedInterval, policy: DurationPolicy) -> Self {
        let nominal_minutes = interval.interval.minutes();
        let minutes = match policy {
            DurationPolicy::Nominal => nominal_minutes,
            DurationPolicy::ShortfallCorrected => {
                nominal_minutes - interval.shortfall() as f64 / 6.0
            }
        };
        Self {
            minutes,
            nominal_minutes,
        }
    }

    fn seconds(&self) -> f64 {
        self.minutes * 60.0
    }

    /// Converts a depth collected over the effective duration to mm/h.
    fn hourly_factor(&self) -> f64 {
        60.0 / self.minutes
    }

    /// Scales a depth collected over the effective duration to the full interval.
    fn accumulation_factor(&self) -> f64 {
        self.nominal_minutes / self.minutes
    }
}

/// Derives the DSD record for one aggregated interval.
///
/// Follows the Parsivel correction of Tokay et al. (2014): each cell is
/// normalised by the sampled volume `duration × area(D) × velocity`, where
/// the area excludes the beam edge lost to partially detected drops.
///
/// The diameter bin width divides only the density `N(D)`, which uses the
/// theoretical fall speed. Concentration, LWC, Z and the moments are volume
/// normalised without the width, so their totals are plain sums over bins.
pub fn derive(
    interval: &AggregatedInterval,
    calib: &CalibrationTable,
    policy: DurationPolicy,
) -> DsdRecord {
    if interval.is_missing() {
        return DsdRecord::missing(interval.start);
    }
    let duration = EffectiveDuration::for_interval(interval, policy);
    if duration.minutes <= 0.0 {
        return DsdRecord::missing(interval.start);
    }
    let seconds = duration.seconds();

    let mut density = [0.0; BIN_COUNT];
    let mut concentration = [0.0; BIN_COUNT];
    let mut lwc = [0.0; BIN_COUNT];
    let mut reflectivity = [0.0; BIN_COUNT];
    let mut rain_rate = [0.0; BIN_COUNT];
    let mut accumulation = [0.0; BIN_COUNT];
    let mut moments = [0.0; MOMENT_ORDERS];
    let mut drop_count = 0.0;
    let mut dmax: f64 = 0.0;

    for d in 0..BIN_COUNT {
        let diameter = calib.diameter_mm[d];
        let width = calib.diameter_width_mm[d];
        let area = calib.effective_area_mm2(d);
        let drop_volume = PI * diameter.powi(3) / 6.0;
        let theoretical_volume =
            seconds * area * calib.velocity_theoretical[d] * MM2_M_TO_M3;

        for v in 0..BIN_COUNT {
            let drops = interval.matrix[[v, d]];
            if drops <= 0.0 {
                continue;
            }
            let sampled_volume = seconds * area * calib.velocity_measured[v] * MM2_M_TO_M3;
            let depth = drops * drop_volume / area;

            density[d] += drops / (theoretical_volume * width);
            concentration[d] += drops / sampled_volume;
            lwc[d] += drops * drop_volume * WATER_DENSITY_G_MM3 / sampled_volume;
            reflectivity[d] += drops * diameter.powi(6) / sampled_volume;
            rain_rate[d] += depth * duration.hourly_factor();
            accumulation[d] += depth * duration.accumulation_factor();
            for (order, moment) in moments.iter_mut().enumerate() {
                *moment += drops * diameter.powi(order as i32) / sampled_volume;
            }
            drop_count += drops;
            dmax = dmax.max(diameter);
        }
    }

    let number_concentration: f64 = density
        .iter()
        .zip(calib.diameter_width_mm.iter())
        .map(|(n, width)| n * width)
        .sum();
    let reflectivity = BinSeries::summed(reflectivity);
    let dm = guarded_ratio(moments[4], moments[3]);
    let sigma_m = mass_spectrum_spread(&concentration, &calib.diameter_mm, dm, moments[3]);

    DsdRecord {
        start: interval.start,
        drop_count,
        density: BinSeries {
            total: number_concentration,
            per_bin: density,
        },
        concentration: BinSeries::summed(concentration),
        lwc: BinSeries::summed(lwc),
        dbz: to_dbz(reflectivity.total),
        reflectivity,
        rain_rate: BinSeries::summed(rain_rate),
        accumulation: BinSeries::summed(accumulation),
        dmax,
        dm,
        sigma_m,
        moments,
    }
}

/// Derives every interval, optionally across the rayon pool. Output order
/// always matches input order.
pub fn derive_all(
    intervals: &[AggregatedInterval],
    calib: &CalibrationTable,
    policy: DurationPolicy,
    parallel: bool,
) -> Vec<DsdRecord> {
    if parallel {
        intervals
            .par_iter()
            .map(|interval| derive(interval, calib, policy))
            .collect()
    } else {
        intervals
            .iter()
            .map(|interval| derive(interval, calib, policy))
            .collect()
    }
}

/// Logarithmic reflectivity; missing unless `z` is positive.
pub fn to_dbz(z: f64) -> f64 {
    if z > 0.0 {
        10.0 * z.log10()
    } else {
        MISSING
    }
}

fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        MISSING
    }
}

fn mass_spectrum_spread(
    concentration: &[f64; BIN_COUNT],
    diameter: &[f64; BIN_COUNT],
    dm: f64,
    third_moment: f64,
) -> f64 {
    if dm.is_nan() {
        return MISSING;
    }
    let weighted: f64 = concentration
        .iter()
        .zip(diameter.iter())
        .map(|(n, &d)| (d - dm).powi(2) * d.powi(3) * n)
        .sum();
    guarded_ratio(weighted, third_moment).sqrt()
}

/// Stage wrapper around [`derive_all`].
pub struct DerivationStage {
    calib: Arc<CalibrationTable>,
    config: Option<PipelineConfig>,
    parallel: bool,
    logger: LogManager,
}

impl DerivationStage {
    pub fn new(calib: Arc<CalibrationTable>) -> Self {
        Self {
            calib,
            config: None,
            parallel: false,
            logger: LogManager::new("derive"),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl ProcessingStage for DerivationStage {
    type Input = Vec<AggregatedInterval>;
    type Output = Vec<DsdRecord>;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()> {
        config.validate()?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: Vec<AggregatedInterval>) -> PipelineResult<Vec<DsdRecord>> {
        let config = self.config.as_ref().ok_or(PipelineError::NotInitialized)?;
        let records = derive_all(&input, &self.calib, config.duration_policy, self.parallel);

        let wet = records
            .iter()
            .filter(|r| !r.is_missing() && r.rain_rate.total > 0.0)
            .count();
        self.logger.record(&format!(
            "derived {} records ({} with precipitation)",
            records.len(),
            wet
        ));
        Ok(records)
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
