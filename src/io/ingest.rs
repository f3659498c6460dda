//! CSV ingest and grouping.
//!
//! This module turns a long-format assessment table into validated
//! `EpidemicRecord`s, and groups those into progress curves.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no fitting logic here

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;

use csv::StringRecord;
use tracing::warn;

use crate::domain::{EpidemicRecord, InputSpec, IntensityBounds, Observation, ProgressCurve, StratumKey};
use crate::error::{AppError, EpiError};

/// Replicate id used when the table has no replicate column.
pub const DEFAULT_REPLICATE: &str = "1";

/// Summary stats about the records actually used.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_records: usize,
    pub n_strata: usize,
    pub time_min: f64,
    pub time_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: validated records + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub records: Vec<EpidemicRecord>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load the CSV named by `spec.path`.
pub fn load_records(spec: &InputSpec) -> Result<IngestedData, AppError> {
    let file = File::open(&spec.path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open CSV '{}': {e}", spec.path.display()),
        )
    })?;
    load_records_from_reader(file, spec)
}

/// Load records from any CSV reader (used directly by tests).
pub fn load_records_from_reader<R: Read>(reader: R, spec: &InputSpec) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let columns = resolve_columns(spec, &header_map)?;

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1, records are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &columns, spec) {
            Ok(r) => records.push(r),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), rows_read, "skipped invalid rows during ingest");
    }

    let rows_used = records.len();
    let stats = compute_stats(&records)
        .ok_or_else(|| AppError::new(3, "No valid rows remain after validation."))?;

    Ok(IngestedData {
        records,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Pool every replicate of a stratum into one curve.
///
/// Times must be strictly increasing within each (stratum, replicate) group;
/// a repeated assessment time is reported as `InvalidParameter`.
pub fn curves_by_stratum(
    records: &[EpidemicRecord],
    bounds: IntensityBounds,
) -> Result<BTreeMap<StratumKey, ProgressCurve>, EpiError> {
    ensure_unique_times(records)?;
    let mut grouped: BTreeMap<StratumKey, Vec<Observation>> = BTreeMap::new();
    for r in records {
        grouped
            .entry(r.stratum.clone())
            .or_default()
            .push(Observation::new(r.time, r.intensity));
    }
    grouped
        .into_iter()
        .map(|(k, obs)| Ok((k, ProgressCurve::new(obs, bounds)?)))
        .collect()
}

/// One curve per (stratum, replicate).
pub fn curves_by_replicate(
    records: &[EpidemicRecord],
    bounds: IntensityBounds,
) -> Result<BTreeMap<(StratumKey, String), ProgressCurve>, EpiError> {
    ensure_unique_times(records)?;
    let mut grouped: BTreeMap<(StratumKey, String), Vec<Observation>> = BTreeMap::new();
    for r in records {
        grouped
            .entry((r.stratum.clone(), r.replicate.clone()))
            .or_default()
            .push(Observation::new(r.time, r.intensity));
    }
    grouped
        .into_iter()
        .map(|(k, obs)| Ok((k, ProgressCurve::new(obs, bounds)?)))
        .collect()
}

fn ensure_unique_times(records: &[EpidemicRecord]) -> Result<(), EpiError> {
    let mut seen: HashSet<(&StratumKey, &str, u64)> = HashSet::with_capacity(records.len());
    for r in records {
        if !seen.insert((&r.stratum, r.replicate.as_str(), r.time.to_bits())) {
            return Err(EpiError::invalid(format!(
                "duplicate assessment time {} in stratum '{}' replicate '{}'",
                r.time, r.stratum, r.replicate
            )));
        }
    }
    Ok(())
}

/// Column indices resolved against the header.
struct Columns {
    time: usize,
    intensity: usize,
    replicate: Option<usize>,
    strata: Vec<usize>,
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, schema validation will incorrectly
    // report missing columns.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_columns(spec: &InputSpec, header_map: &HashMap<String, usize>) -> Result<Columns, AppError> {
    let lookup = |name: &str| header_map.get(&normalize_header_name(name)).copied();
    let required = |name: &str| {
        lookup(name).ok_or_else(|| AppError::new(2, format!("Missing required column: `{name}`")))
    };

    let time = required(spec.time_col.as_str())?;
    let intensity = required(spec.intensity_col.as_str())?;
    // A missing replicate column just means a single replicate.
    let replicate = spec.replicate_col.as_deref().and_then(lookup);
    let strata = spec
        .stratum_cols
        .iter()
        .map(|c| required(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Columns {
        time,
        intensity,
        replicate,
        strata,
    })
}

fn parse_row(record: &StringRecord, columns: &Columns, spec: &InputSpec) -> Result<EpidemicRecord, String> {
    let time = parse_f64(record, columns.time, &spec.time_col)?;
    if !(time.is_finite() && time >= 0.0) {
        return Err(format!("`{}` must be a non-negative number, got {time}", spec.time_col));
    }

    let raw = parse_f64(record, columns.intensity, &spec.intensity_col)?;
    let intensity = spec.scale.to_proportion(raw);
    let in_range = match spec.bounds {
        IntensityBounds::Unit => (0.0..=1.0).contains(&intensity),
        IntensityBounds::Unbounded => intensity >= 0.0,
    };
    if !(intensity.is_finite() && in_range) {
        return Err(format!("`{}` value {raw} is out of range", spec.intensity_col));
    }

    let replicate = match columns.replicate {
        Some(idx) => get_non_empty(record, idx).unwrap_or(DEFAULT_REPLICATE).to_string(),
        None => DEFAULT_REPLICATE.to_string(),
    };

    let parts = columns
        .strata
        .iter()
        .zip(&spec.stratum_cols)
        .map(|(&idx, name)| get_non_empty(record, idx).ok_or_else(|| format!("Missing value for `{name}`")))
        .collect::<Result<Vec<&str>, String>>()?;

    Ok(EpidemicRecord {
        stratum: StratumKey::from_parts(&parts),
        replicate,
        time,
        intensity,
    })
}

fn get_non_empty(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).filter(|s| !s.is_empty())
}

fn parse_f64(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = get_non_empty(record, idx).ok_or_else(|| format!("Missing value for `{name}`"))?;
    raw.parse::<f64>()
        .map_err(|_| format!("Invalid number for `{name}`: '{raw}'"))
}

fn compute_stats(records: &[EpidemicRecord]) -> Option<DatasetStats> {
    if records.is_empty() {
        return None;
    }
    let mut time_min = f64::INFINITY;
    let mut time_max = f64::NEG_INFINITY;
    let mut strata = HashSet::new();
    for r in records {
        time_min = time_min.min(r.time);
        time_max = time_max.max(r.time);
        strata.insert(&r.stratum);
    }
    Some(DatasetStats {
        n_records: records.len(),
        n_strata: strata.len(),
        time_min,
        time_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntensityScale;
    use std::path::PathBuf;

    fn spec(strata: &[&str]) -> InputSpec {
        InputSpec {
            path: PathBuf::from("unused.csv"),
            time_col: "time".to_string(),
            intensity_col: "sev".to_string(),
            replicate_col: Some("rep".to_string()),
            stratum_cols: strata.iter().map(|s| s.to_string()).collect(),
            scale: IntensityScale::Percent,
            bounds: IntensityBounds::Unit,
        }
    }

    const CSV: &str = "\u{feff}Irrigation,Cultivar,Rep,Time,Sev\n\
        yes,A,1,0,1\n\
        yes,A,1,7,10\n\
        yes,A,1,14,40\n\
        yes,A,2,0,2\n\
        yes,A,2,7,12\n\
        no,A,1,0,1\n\
        no,A,1,7,abc\n\
        no,A,1,14,150\n\
        no,A,1,21,60\n";

    #[test]
    fn ingest_scales_percent_and_reports_bad_rows() {
        let data = load_records_from_reader(CSV.as_bytes(), &spec(&["irrigation", "cultivar"])).unwrap();
        assert_eq!(data.rows_read, 9);
        assert_eq!(data.rows_used, 7);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 8);
        assert_eq!(data.stats.n_strata, 2);
        assert!((data.records[2].intensity - 0.4).abs() < 1e-12);
        assert_eq!(data.records[0].stratum.as_str(), "yes/A");
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let mut s = spec(&[]);
        s.time_col = "day".to_string();
        let err = load_records_from_reader(CSV.as_bytes(), &s).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("day"));
    }

    #[test]
    fn grouping_pools_replicates_by_stratum() {
        let data = load_records_from_reader(CSV.as_bytes(), &spec(&["irrigation"])).unwrap();
        let pooled = curves_by_stratum(&data.records, IntensityBounds::Unit).unwrap();
        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled[&StratumKey::new("yes")].len(), 5);
        assert_eq!(pooled[&StratumKey::new("yes")].times(), vec![0.0, 0.0, 7.0, 7.0, 14.0]);

        let per_rep = curves_by_replicate(&data.records, IntensityBounds::Unit).unwrap();
        assert_eq!(per_rep.len(), 3);
        assert!(per_rep.values().all(|c| c.has_strictly_increasing_times()));
    }

    #[test]
    fn duplicate_times_within_a_replicate_are_rejected() {
        let csv = "time,sev\n0,1\n7,5\n7,6\n";
        let data = load_records_from_reader(csv.as_bytes(), &spec(&[])).unwrap();
        assert_eq!(data.records[0].stratum.as_str(), StratumKey::ALL);
        assert!(matches!(
            curves_by_stratum(&data.records, IntensityBounds::Unit),
            Err(EpiError::InvalidParameter(_))
        ));
    }
}
