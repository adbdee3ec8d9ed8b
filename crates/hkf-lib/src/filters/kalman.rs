//! Scalar recursive estimators chained into a two-stage denoising cascade.
//!
//! Each stage assumes a constant-plus-noise process model: the prediction for
//! the next sample is the previous estimate, and only the error variance grows
//! by the process noise between samples.

use crate::error::ConfigError;
use crate::signal::TimeSeries;
use serde::{Deserialize, Serialize};

/// Error variance both stages start from.
pub const INITIAL_ERROR_VARIANCE: f64 = 1.0;

/// Running state of one estimator stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub estimate: f64,
    pub error_variance: f64,
}

impl FilterState {
    pub fn new(estimate: f64) -> Self {
        Self {
            estimate,
            error_variance: INITIAL_ERROR_VARIANCE,
        }
    }

    /// Advance this state by one observation using validated parameters.
    pub fn update(self, observation: f64, params: &KalmanParams) -> Self {
        filter_step(
            observation,
            self,
            params.process_noise,
            params.measurement_noise,
        )
    }
}

/// One predict/correct step. Pure: the returned state depends only on the inputs.
///
/// The caller guarantees `prior.error_variance + process_noise + measurement_noise`
/// is nonzero; [`KalmanParams`] enforces this for the configured path.
pub fn filter_step(
    observation: f64,
    prior: FilterState,
    process_noise: f64,
    measurement_noise: f64,
) -> FilterState {
    let predicted_estimate = prior.estimate;
    let predicted_variance = prior.error_variance + process_noise;

    let gain = predicted_variance / (predicted_variance + measurement_noise);
    FilterState {
        estimate: predicted_estimate + gain * (observation - predicted_estimate),
        error_variance: (1.0 - gain) * predicted_variance,
    }
}

/// Noise parameters of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKalmanParams")]
pub struct KalmanParams {
    process_noise: f64,
    measurement_noise: f64,
}

#[derive(Deserialize)]
struct RawKalmanParams {
    process_noise: f64,
    measurement_noise: f64,
}

impl TryFrom<RawKalmanParams> for KalmanParams {
    type Error = ConfigError;

    fn try_from(raw: RawKalmanParams) -> Result<Self, Self::Error> {
        KalmanParams::new(raw.process_noise, raw.measurement_noise)
    }
}

impl KalmanParams {
    /// Both noise terms must be positive and finite so the gain denominator can never vanish.
    pub fn new(process_noise: f64, measurement_noise: f64) -> Result<Self, ConfigError> {
        check_positive("process_noise", process_noise)?;
        check_positive("measurement_noise", measurement_noise)?;
        Ok(Self {
            process_noise,
            measurement_noise,
        })
    }

    pub fn process_noise(&self) -> f64 {
        self.process_noise
    }

    pub fn measurement_noise(&self) -> f64 {
        self.measurement_noise
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveNoise { name, value })
    }
}

/// Parameters of the coarse (stage 1) and fine (stage 2) estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Loose tracking of the raw signal: large measurement noise.
    pub stage1: KalmanParams,
    /// Tighter smoothing of stage 1's output.
    pub stage2: KalmanParams,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            stage1: KalmanParams {
                process_noise: 0.001,
                measurement_noise: 10.0,
            },
            stage2: KalmanParams {
                process_noise: 0.001,
                measurement_noise: 1.0,
            },
        }
    }
}

impl CascadeConfig {
    pub fn new(
        process_noise_1: f64,
        measurement_noise_1: f64,
        process_noise_2: f64,
        measurement_noise_2: f64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            stage1: KalmanParams::new(process_noise_1, measurement_noise_1)?,
            stage2: KalmanParams::new(process_noise_2, measurement_noise_2)?,
        })
    }
}

/// Run both stages over `signal` and return the stage 2 estimates.
///
/// Output length always equals input length and `out[0] == signal[0]`.
pub fn cascade_filter(signal: &[f64], cfg: &CascadeConfig) -> Vec<f64> {
    let Some(&first) = signal.first() else {
        return Vec::new();
    };
    let mut coarse = FilterState::new(first);
    let mut fine = FilterState::new(first);
    let mut out = Vec::with_capacity(signal.len());
    out.push(fine.estimate);
    for &sample in &signal[1..] {
        coarse = coarse.update(sample, &cfg.stage1);
        fine = fine.update(coarse.estimate, &cfg.stage2);
        out.push(fine.estimate);
    }
    out
}

/// Denoise a whole time series, keeping its sampling frequency.
pub fn denoise(ts: &TimeSeries, cfg: &CascadeConfig) -> TimeSeries {
    TimeSeries {
        fs: ts.fs,
        data: cascade_filter(&ts.data, cfg),
    }
}
