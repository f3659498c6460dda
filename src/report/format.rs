//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{AreaRow, FitConfig, FitMethod, FitResult, SimConfig, SimulatedCurve};
use crate::fit::MultiFit;
use crate::io::ingest::IngestedData;
use crate::report::rank_fits;

/// Format the full fit summary: dataset stats, then one ranked table per stratum.
pub fn format_fit_summary(ingest: &IngestedData, fits: &MultiFit, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== epi - Disease Progress Curve Fit ===\n");
    out.push_str(&format!("Input: {}\n", config.input.path.display()));
    out.push_str(&format!(
        "Rows: read={} used={} skipped={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    ));
    out.push_str(&format!(
        "Records: n={} | strata={} | time=[{:.2}, {:.2}]\n",
        ingest.stats.n_records, ingest.stats.n_strata, ingest.stats.time_min, ingest.stats.time_max
    ));
    out.push_str(&format!(
        "Method: {:?} | K: {} | confidence: {:.0}% | ranked by {:?}\n",
        config.method,
        if config.estimate_k { "estimated" } else { "fixed at 1" },
        config.confidence * 100.0,
        config.rank_by,
    ));

    for (stratum, models) in &fits.fits {
        out.push_str(&format!("\nStratum: {stratum}\n"));
        out.push_str(&table_header());
        for (i, fit) in rank_fits(models, config.rank_by).into_iter().enumerate() {
            let marker = if i == 0 { '*' } else { ' ' };
            out.push_str(&format_fit_row(marker, fit, config.method));
        }
    }

    if !fits.failures.is_empty() {
        out.push_str("\nFailed fits:\n");
        for f in &fits.failures {
            out.push_str(&format!(
                "  {} / {}: {}\n",
                f.stratum,
                f.model.display_name(),
                f.error
            ));
        }
    }

    out
}

fn table_header() -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "  {:<14} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8}\n",
            "model", "y0", "r", "K", "CCC", "RSE", "R2"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "  {:-<14} {:-<10} {:-<10} {:-<8} {:-<8} {:-<8} {:-<8}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    out
}

fn format_fit_row(marker: char, fit: &FitResult, requested: FitMethod) -> String {
    let k = fit
        .params
        .k()
        .map(|k| format!("{k:.4}"))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{marker} {:<14} {:>10.5} {:>10.5} {:>8} {:>8.4} {:>8.4} {:>8.4}",
        fit.model.display_name(),
        fit.params.y0(),
        fit.params.r(),
        k,
        fit.quality.ccc,
        fit.quality.rse,
        fit.quality.r_squared,
    );
    if fit.method != requested {
        line.push_str(" (linear fallback)");
    }
    line.push('\n');
    line
}

/// Per-parameter estimates with standard errors and confidence intervals.
pub fn format_estimates(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({:?})\n", fit.model.display_name(), fit.method));
    for e in &fit.estimates {
        out.push_str(&format!(
            "  {:<3} {:>12.6}  se={:<12}  ci=[{}, {}]\n",
            e.name,
            e.estimate,
            fmt_opt(e.std_error),
            fmt_opt(e.ci_lower),
            fmt_opt(e.ci_upper),
        ));
    }
    if let Some((t, y)) = fit.params.inflection_point() {
        out.push_str(&format!("  inflection at t={t:.3} (y={y:.4})\n"));
    }
    if let Some(iterations) = fit.iterations {
        out.push_str(&format!("  iterations: {iterations}\n"));
    }
    out
}

/// Describe a simulation run.
pub fn format_simulation_summary(sim: &SimulatedCurve, config: &SimConfig) -> String {
    let mut out = String::new();
    out.push_str("=== epi - Epidemic Simulation ===\n");
    out.push_str(&format!("Model: {}\n", sim.params));
    out.push_str(&format!(
        "Grid: dt={} | steps={} | t=[0, {}]\n",
        config.dt,
        config.n_steps,
        config.dt * config.n_steps.saturating_sub(1) as f64
    ));
    out.push_str(&format!(
        "Replicates: {} | noise alpha={} | seed={}\n",
        config.n_replicates, config.noise_alpha, config.seed
    ));

    let finals: Vec<f64> = (1..=config.n_replicates)
        .filter_map(|rep| sim.replicate(rep).last().map(|p| p.random_y))
        .collect();
    if let Some(&first) = sim.points.first() {
        let last_y = sim.replicate(1).last().map(|p| p.y).unwrap_or(first.y);
        out.push_str(&format!("Deterministic: y(0)={:.4} -> y(end)={:.4}\n", first.y, last_y));
    }
    if !finals.is_empty() {
        let min = finals.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        out.push_str(&format!("Final noisy intensity: [{min:.4}, {max:.4}]\n"));
    }
    out
}

/// Format the area table.
pub fn format_area_table(rows: &[AreaRow]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<20} {:<6} {:>4} {:>10} {:>10} {:>8} {:>8}\n",
            "stratum", "rep", "n", "AUDPC", "AUDPS", "rAUDPC", "rAUDPS"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<20} {:-<6} {:-<4} {:-<10} {:-<10} {:-<8} {:-<8}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        out.push_str(&format!(
            "{:<20} {:<6} {:>4} {:>10.4} {:>10.4} {:>8.4} {:>8.4}\n",
            truncate(r.stratum.as_str(), 20),
            truncate(&r.replicate, 6),
            r.n,
            r.audpc,
            r.audps,
            r.relative_audpc,
            r.relative_audps,
        ));
    }
    out
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_else(|| "n/a".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
