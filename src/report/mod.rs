//! Reporting utilities: rankings and formatted terminal output.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{FitResult, ModelKind, RankRule};

pub mod format;

pub use format::*;

/// Order one stratum's fits by `rule`, best first.
///
/// Ties (and NaN scores, which sort last) keep model order.
pub fn rank_fits(fits: &BTreeMap<ModelKind, FitResult>, rule: RankRule) -> Vec<&FitResult> {
    let mut ranked: Vec<&FitResult> = fits.values().collect();
    ranked.sort_by(|a, b| {
        let (qa, qb) = (&a.quality, &b.quality);
        match rule {
            RankRule::Rse => nan_last(qa.rse, qb.rse),
            RankRule::Ccc => nan_last(-qa.ccc, -qb.ccc),
            RankRule::RSquared => nan_last(-qa.r_squared, -qb.r_squared),
        }
    });
    ranked
}

fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}
