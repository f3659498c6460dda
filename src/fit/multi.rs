//! Fit many strata × models in one pass.
//!
//! Every (stratum, model) cell is independent, so cells are evaluated in
//! parallel with rayon and collected back in `(stratum, model)` order. A failed
//! cell never aborts the others: it is logged, recorded in `failures`, and left
//! out of `fits`. Strata whose every model failed therefore have no entry.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::warn;

use crate::domain::{FitMethod, FitResult, ModelKind, ProgressCurve, StratumKey};
use crate::error::EpiError;
use crate::fit::linear::{fit_linear, LinearOptions};
use crate::fit::nonlinear::{fit_nonlinear, NonlinearOptions};

/// How each cell is fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiFitOptions {
    pub method: FitMethod,
    /// Free the asymptote of logistic/Gompertz fits (nonlinear path only).
    pub estimate_k: bool,
    /// Substitute the linear fit when a nonlinear fit does not converge.
    pub fallback_linear: bool,
    pub linear: LinearOptions,
    pub nonlinear: NonlinearOptions,
}

impl Default for MultiFitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::Linear,
            estimate_k: false,
            fallback_linear: false,
            linear: LinearOptions::default(),
            nonlinear: NonlinearOptions::default(),
        }
    }
}

/// A (stratum, model) cell that could not be fit.
#[derive(Debug, Clone)]
pub struct CellFailure {
    pub stratum: StratumKey,
    pub model: ModelKind,
    pub error: EpiError,
}

/// All successful fits keyed by stratum then model, plus the failed cells.
#[derive(Debug, Clone, Default)]
pub struct MultiFit {
    pub fits: BTreeMap<StratumKey, BTreeMap<ModelKind, FitResult>>,
    pub failures: Vec<CellFailure>,
}

impl MultiFit {
    pub fn get(&self, stratum: &StratumKey, model: ModelKind) -> Option<&FitResult> {
        self.fits.get(stratum).and_then(|m| m.get(&model))
    }

    /// Iterate `(stratum, fit)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&StratumKey, &FitResult)> {
        self.fits
            .iter()
            .flat_map(|(stratum, models)| models.values().map(move |fit| (stratum, fit)))
    }
}

/// Fit every requested model to every stratum's curve.
pub fn fit_multi(
    curves: &BTreeMap<StratumKey, ProgressCurve>,
    models: &[ModelKind],
    opts: &MultiFitOptions,
) -> MultiFit {
    let models: BTreeSet<ModelKind> = models.iter().copied().collect();
    let cells: Vec<(&StratumKey, &ProgressCurve, ModelKind)> = curves
        .iter()
        .flat_map(|(stratum, curve)| models.iter().map(move |&m| (stratum, curve, m)))
        .collect();

    // Indexed parallel collect preserves input order.
    let outcomes: Vec<Result<FitResult, EpiError>> = cells
        .par_iter()
        .map(|&(stratum, curve, model)| fit_cell(stratum, curve, model, opts))
        .collect();

    let mut out = MultiFit::default();
    for ((stratum, _, model), outcome) in cells.into_iter().zip(outcomes) {
        match outcome {
            Ok(fit) => {
                out.fits.entry(stratum.clone()).or_default().insert(model, fit);
            }
            Err(error) => {
                warn!(
                    stratum = %stratum,
                    model = model.display_name(),
                    error = %error,
                    "fit failed; cell omitted"
                );
                out.failures.push(CellFailure {
                    stratum: stratum.clone(),
                    model,
                    error,
                });
            }
        }
    }
    out
}

fn fit_cell(
    stratum: &StratumKey,
    curve: &ProgressCurve,
    model: ModelKind,
    opts: &MultiFitOptions,
) -> Result<FitResult, EpiError> {
    match opts.method {
        FitMethod::Linear => fit_linear(curve, model, &opts.linear),
        FitMethod::Nonlinear => match fit_nonlinear(curve, model, opts.estimate_k, &opts.nonlinear) {
            Err(err @ EpiError::NoConvergence { .. }) if opts.fallback_linear => {
                warn!(
                    stratum = %stratum,
                    model = model.display_name(),
                    error = %err,
                    "falling back to linear fit"
                );
                fit_linear(curve, model, &opts.linear)
            }
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelParams;

    fn curve_from(params: ModelParams, times: &[f64]) -> ProgressCurve {
        let y: Vec<f64> = times.iter().map(|&t| params.predict(t)).collect();
        ProgressCurve::from_pairs(times, &y).unwrap()
    }

    fn strata() -> BTreeMap<StratumKey, ProgressCurve> {
        let times: Vec<f64> = (0..8).map(|i| i as f64 * 7.0).collect();
        let mut curves = BTreeMap::new();
        curves.insert(
            StratumKey::new("a"),
            curve_from(ModelParams::Logistic { y0: 0.01, r: 0.12, k: 1.0 }, &times),
        );
        curves.insert(
            StratumKey::new("b"),
            curve_from(ModelParams::Gompertz { y0: 0.02, r: 0.06, k: 1.0 }, &times),
        );
        curves.insert(
            StratumKey::new("c"),
            curve_from(ModelParams::Monomolecular { y0: 0.05, r: 0.03 }, &times),
        );
        curves
    }

    #[test]
    fn returns_one_entry_per_stratum_with_all_models() {
        let curves = strata();
        let out = fit_multi(&curves, &ModelKind::ALL, &MultiFitOptions::default());

        assert_eq!(out.fits.len(), 3);
        assert!(out.failures.is_empty());
        for models in out.fits.values() {
            let kinds: Vec<ModelKind> = models.keys().copied().collect();
            assert_eq!(kinds, ModelKind::ALL.to_vec());
        }
        // The generating model fits best in its own stratum.
        let a = &out.fits[&StratumKey::new("a")];
        assert!(a[&ModelKind::Logistic].quality.rse < a[&ModelKind::Exponential].quality.rse);
    }

    #[test]
    fn strata_where_every_model_fails_are_omitted() {
        let mut curves = strata();
        curves.insert(
            StratumKey::new("short"),
            ProgressCurve::from_pairs(&[0.0, 7.0], &[0.1, 0.2]).unwrap(),
        );
        let models = [ModelKind::Logistic, ModelKind::Gompertz];
        let out = fit_multi(&curves, &models, &MultiFitOptions::default());

        assert_eq!(out.fits.len(), 3);
        assert!(!out.fits.contains_key(&StratumKey::new("short")));
        assert_eq!(out.failures.len(), 2);
        assert!(out.failures.iter().all(|f| f.stratum.as_str() == "short"));
        assert!(matches!(out.failures[0].error, EpiError::InsufficientData { .. }));
    }

    #[test]
    fn nonlinear_results_match_sequential_fits() {
        let mut curves = strata();
        curves.remove(&StratumKey::new("c"));
        let opts = MultiFitOptions {
            method: FitMethod::Nonlinear,
            ..MultiFitOptions::default()
        };
        // Duplicate model requests collapse to one cell per stratum.
        let out = fit_multi(&curves, &[ModelKind::Logistic, ModelKind::Logistic], &opts);
        assert_eq!(out.iter().count(), 2);

        for (stratum, curve) in &curves {
            let direct = fit_nonlinear(curve, ModelKind::Logistic, false, &opts.nonlinear).unwrap();
            assert_eq!(out.get(stratum, ModelKind::Logistic), Some(&direct));
        }
    }

    #[test]
    fn fallback_replaces_non_converged_cells() {
        let curves = strata();
        let strict = MultiFitOptions {
            method: FitMethod::Nonlinear,
            estimate_k: true,
            nonlinear: NonlinearOptions {
                max_iterations: 1,
                ..NonlinearOptions::default()
            },
            ..MultiFitOptions::default()
        };
        let without = fit_multi(&curves, &[ModelKind::Gompertz], &strict);
        let with = fit_multi(
            &curves,
            &[ModelKind::Gompertz],
            &MultiFitOptions {
                fallback_linear: true,
                ..strict
            },
        );

        let no_convergence = without
            .failures
            .iter()
            .filter(|f| matches!(f.error, EpiError::NoConvergence { .. }))
            .count();
        assert!(no_convergence > 0);
        assert!(with.failures.is_empty());
        assert_eq!(with.fits.len(), 3);
        assert!(with.iter().any(|(_, fit)| fit.method == FitMethod::Linear));
    }
}
