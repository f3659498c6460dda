//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and simulation
//! - exported to CSV/JSON
//! - handed to an external plotting collaborator

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EpiError;

/// A single disease assessment: intensity (proportion) observed at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub intensity: f64,
}

impl Observation {
    pub fn new(time: f64, intensity: f64) -> Self {
        Self { time, intensity }
    }
}

/// Admissible range for observed intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntensityBounds {
    /// Intensities must lie in `[0, 1]`.
    #[default]
    Unit,
    /// Intensities must be `>= 0` but may exceed 1 (used when the asymptote `K`
    /// is estimated rather than fixed).
    Unbounded,
}

/// How raw intensity values are expressed in the input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntensityScale {
    /// Already a proportion.
    #[default]
    Proportion,
    /// Percent severity/incidence; divided by 100 on ingest.
    Percent,
}

impl IntensityScale {
    pub fn to_proportion(self, value: f64) -> f64 {
        match self {
            IntensityScale::Proportion => value,
            IntensityScale::Percent => value / 100.0,
        }
    }
}

/// A disease progress curve: observations ordered by non-decreasing time.
///
/// Pooled curves (several replicates of one stratum) may repeat time points;
/// a single replicate never does (enforced at ingest).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressCurve {
    observations: Vec<Observation>,
}

impl ProgressCurve {
    /// Validate and sort observations by time.
    pub fn new(mut observations: Vec<Observation>, bounds: IntensityBounds) -> Result<Self, EpiError> {
        for o in &observations {
            if !(o.time.is_finite() && o.time >= 0.0) {
                return Err(EpiError::invalid(format!(
                    "time must be finite and non-negative, got {}",
                    o.time
                )));
            }
            let in_range = match bounds {
                IntensityBounds::Unit => (0.0..=1.0).contains(&o.intensity),
                IntensityBounds::Unbounded => o.intensity >= 0.0,
            };
            if !(o.intensity.is_finite() && in_range) {
                return Err(EpiError::invalid(format!(
                    "intensity {} at time {} is outside the admissible range",
                    o.intensity, o.time
                )));
            }
        }
        // Stable sort keeps replicate order for tied times.
        observations.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(Self { observations })
    }

    /// Build a unit-bounded curve from parallel time/intensity slices.
    pub fn from_pairs(times: &[f64], intensities: &[f64]) -> Result<Self, EpiError> {
        if times.len() != intensities.len() {
            return Err(EpiError::invalid(format!(
                "time/intensity length mismatch: {} vs {}",
                times.len(),
                intensities.len()
            )));
        }
        let obs = times
            .iter()
            .zip(intensities)
            .map(|(&t, &y)| Observation::new(t, y))
            .collect();
        Self::new(obs, IntensityBounds::Unit)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.time).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.intensity).collect()
    }

    /// `t_last - t_first` (0 for fewer than two points).
    pub fn span(&self) -> f64 {
        match (self.observations.first(), self.observations.last()) {
            (Some(a), Some(b)) => b.time - a.time,
            _ => 0.0,
        }
    }

    pub fn max_intensity(&self) -> f64 {
        self.observations
            .iter()
            .map(|o| o.intensity)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn has_strictly_increasing_times(&self) -> bool {
        self.observations.windows(2).all(|w| w[1].time > w[0].time)
    }
}

/// Grouping key over which curves are fit independently (e.g. a treatment
/// combination such as `"irrigated/cv-A"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StratumKey(String);

impl StratumKey {
    /// Key used when the input has no stratum columns.
    pub const ALL: &'static str = "all";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Join several column values into one key.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        if parts.is_empty() {
            return Self::new(Self::ALL);
        }
        let joined: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
        Self(joined.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StratumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the long-format input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpidemicRecord {
    pub stratum: StratumKey,
    pub replicate: String,
    pub time: f64,
    pub intensity: f64,
}

/// Disease progress model family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Exponential,
    Monomolecular,
    Logistic,
    Gompertz,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Exponential,
        ModelKind::Monomolecular,
        ModelKind::Logistic,
        ModelKind::Gompertz,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Exponential => "Exponential",
            ModelKind::Monomolecular => "Monomolecular",
            ModelKind::Logistic => "Logistic",
            ModelKind::Gompertz => "Gompertz",
        }
    }

    /// Whether the model has an upper asymptote `K` that can be estimated.
    pub fn has_asymptote(self) -> bool {
        matches!(self, ModelKind::Logistic | ModelKind::Gompertz)
    }
}

/// Parameters of a fitted or hand-specified model.
///
/// `y0` is the initial intensity, `r` the apparent infection rate and `k` the
/// upper asymptote (1 when not estimated).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ModelParams {
    Exponential { y0: f64, r: f64 },
    Monomolecular { y0: f64, r: f64 },
    Logistic { y0: f64, r: f64, k: f64 },
    Gompertz { y0: f64, r: f64, k: f64 },
}

impl ModelParams {
    /// Build parameters for `kind`; `k` is ignored by models without an asymptote
    /// and defaults to 1 for those that have one.
    pub fn new(kind: ModelKind, y0: f64, r: f64, k: Option<f64>) -> Self {
        let k = k.unwrap_or(1.0);
        match kind {
            ModelKind::Exponential => ModelParams::Exponential { y0, r },
            ModelKind::Monomolecular => ModelParams::Monomolecular { y0, r },
            ModelKind::Logistic => ModelParams::Logistic { y0, r, k },
            ModelKind::Gompertz => ModelParams::Gompertz { y0, r, k },
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::Exponential { .. } => ModelKind::Exponential,
            ModelParams::Monomolecular { .. } => ModelKind::Monomolecular,
            ModelParams::Logistic { .. } => ModelKind::Logistic,
            ModelParams::Gompertz { .. } => ModelKind::Gompertz,
        }
    }

    pub fn y0(&self) -> f64 {
        match *self {
            ModelParams::Exponential { y0, .. }
            | ModelParams::Monomolecular { y0, .. }
            | ModelParams::Logistic { y0, .. }
            | ModelParams::Gompertz { y0, .. } => y0,
        }
    }

    pub fn r(&self) -> f64 {
        match *self {
            ModelParams::Exponential { r, .. }
            | ModelParams::Monomolecular { r, .. }
            | ModelParams::Logistic { r, .. }
            | ModelParams::Gompertz { r, .. } => r,
        }
    }

    /// Upper asymptote, if the model has one.
    pub fn k(&self) -> Option<f64> {
        match *self {
            ModelParams::Logistic { k, .. } | ModelParams::Gompertz { k, .. } => Some(k),
            _ => None,
        }
    }

    /// Check `y0 ∈ (0,1)`, finite `r`, and `K ∈ (y0, ∞)`.
    pub fn validate(&self) -> Result<(), EpiError> {
        let y0 = self.y0();
        if !(y0.is_finite() && y0 > 0.0 && y0 < 1.0) {
            return Err(EpiError::invalid(format!("y0 must lie in (0, 1), got {y0}")));
        }
        if !self.r().is_finite() {
            return Err(EpiError::invalid(format!("r must be finite, got {}", self.r())));
        }
        if let Some(k) = self.k() {
            if !(k.is_finite() && k > y0) {
                return Err(EpiError::invalid(format!("K must be finite and > y0 ({y0}), got {k}")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ModelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "y0={:.6}, r={:.6}", self.y0(), self.r())?;
        if let Some(k) = self.k() {
            write!(f, ", K={k:.6}")?;
        }
        Ok(())
    }
}

/// Which estimation strategy produced a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// OLS on the linearized intensity.
    Linear,
    /// Levenberg–Marquardt on the untransformed intensity.
    Nonlinear,
}

/// Point estimate with uncertainty for one named parameter.
///
/// Uncertainty is `None` when the information matrix is singular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

/// Goodness-of-fit diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    /// Lin's concordance correlation coefficient, predicted vs observed.
    pub ccc: f64,
    /// `sqrt(SS_res / (n - p))` on the intensity scale.
    pub rse: f64,
    /// Regression R² (linear path) or `1 - SS_res/SS_tot` (nonlinear path).
    pub r_squared: f64,
    pub n: usize,
    pub df: usize,
}

/// One row of the predicted-vs-observed table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub time: f64,
    pub observed: f64,
    pub predicted: f64,
    pub residual: f64,
}

/// Fit output for a single model on a single curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub method: FitMethod,
    pub params: ModelParams,
    pub estimates: Vec<ParamEstimate>,
    pub quality: GoodnessOfFit,
    pub predictions: Vec<PredictionRow>,
    /// Solver iterations (nonlinear fits only).
    pub iterations: Option<usize>,
}

impl FitResult {
    pub fn estimate(&self, name: &str) -> Option<&ParamEstimate> {
        self.estimates.iter().find(|e| e.name == name)
    }
}

/// One point of a simulated epidemic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPoint {
    pub replicate: usize,
    pub time: f64,
    pub y: f64,
    pub random_y: f64,
}

/// Simulator output: every replicate's points, replicate-major, time-ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCurve {
    pub params: ModelParams,
    pub points: Vec<SimulatedPoint>,
}

impl SimulatedCurve {
    pub fn replicate(&self, id: usize) -> impl Iterator<Item = &SimulatedPoint> {
        self.points.iter().filter(move |p| p.replicate == id)
    }
}

/// Area metrics for one (stratum, replicate) curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRow {
    pub stratum: StratumKey,
    pub replicate: String,
    pub n: usize,
    pub audpc: f64,
    pub audps: f64,
    pub relative_audpc: f64,
    pub relative_audps: f64,
}

/// Explicit rule for ordering the fits of one stratum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RankRule {
    /// Smallest residual standard error first.
    #[default]
    Rse,
    /// Largest concordance correlation first.
    Ccc,
    /// Largest R² first.
    #[value(name = "r2")]
    #[serde(rename = "r2")]
    RSquared,
}

/// Column mapping for the long-format input table.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub path: PathBuf,
    pub time_col: String,
    pub intensity_col: String,
    /// Replicate column; rows without it share replicate `"1"`.
    pub replicate_col: Option<String>,
    pub stratum_cols: Vec<String>,
    pub scale: IntensityScale,
    pub bounds: IntensityBounds,
}

/// Configuration of an `epi fit` run.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub input: InputSpec,
    pub models: Vec<ModelKind>,
    pub method: FitMethod,
    pub estimate_k: bool,
    pub fallback_linear: bool,
    pub max_iterations: usize,
    pub confidence: f64,
    pub rank_by: RankRule,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_params: Option<PathBuf>,
    pub export_predictions: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

/// Configuration of an `epi area` run.
#[derive(Debug, Clone)]
pub struct AreaConfig {
    pub input: InputSpec,
    pub export: Option<PathBuf>,
}

/// Configuration of an `epi simulate` run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub params: ModelParams,
    pub dt: f64,
    pub n_steps: usize,
    pub n_replicates: usize,
    pub noise_alpha: f64,
    pub seed: u64,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_curve_sorts_by_time() {
        let curve = ProgressCurve::from_pairs(&[14.0, 0.0, 7.0], &[0.3, 0.1, 0.2]).unwrap();
        assert_eq!(curve.times(), vec![0.0, 7.0, 14.0]);
        assert_eq!(curve.intensities(), vec![0.1, 0.2, 0.3]);
        assert!((curve.span() - 14.0).abs() < 1e-12);
    }

    #[test]
    fn progress_curve_rejects_out_of_range_intensity() {
        assert!(ProgressCurve::from_pairs(&[0.0, 1.0], &[0.1, 1.2]).is_err());
        assert!(ProgressCurve::from_pairs(&[0.0, 1.0], &[-0.1, 0.5]).is_err());
        assert!(ProgressCurve::from_pairs(&[-1.0, 1.0], &[0.1, 0.5]).is_err());

        let obs = vec![Observation::new(0.0, 0.1), Observation::new(1.0, 1.2)];
        assert!(ProgressCurve::new(obs, IntensityBounds::Unbounded).is_ok());
    }

    #[test]
    fn stratum_key_joins_parts() {
        assert_eq!(StratumKey::from_parts(&["irr", "cvA"]).as_str(), "irr/cvA");
        let empty: [&str; 0] = [];
        assert_eq!(StratumKey::from_parts(&empty).as_str(), StratumKey::ALL);
    }

    #[test]
    fn params_validation_enforces_domains() {
        assert!(ModelParams::new(ModelKind::Logistic, 0.01, 0.2, None).validate().is_ok());
        assert!(ModelParams::new(ModelKind::Logistic, 0.0, 0.2, None).validate().is_err());
        assert!(ModelParams::new(ModelKind::Gompertz, 0.5, 0.2, Some(0.4)).validate().is_err());
        assert!(ModelParams::new(ModelKind::Exponential, 1.0, 0.2, None).validate().is_err());
        assert_eq!(ModelParams::new(ModelKind::Monomolecular, 0.1, 0.2, Some(3.0)).k(), None);
    }
}
