// src/reshape/mod.rs
//
// The core of the pipeline: select the total-population / both-sexes
// unemployment series, unpivot the nested per-quarter observations into flat
// rows, and aggregate them to one annual mean per province.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::ingest::{MetaEntry, RawRecord};

/// Full-string match for the series of interest. The wildcard segment is the
/// demographic-group descriptor ("Total", age bands, ...); the trailing space
/// is present in the source labels.
static TARGET_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Tasa de paro de la población\. .*\. Ambos sexos\. Total\. $")
        .expect("invalid label pattern")
});

const PROVINCE_VARIABLE: &str = "Provincias";

/// One (province, sub-period) observation after expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceYearRow {
    pub province: String,
    pub sub_period: String,
    pub year: i32,
    pub value: Option<f64>,
}

/// Final output row: the annual mean for one province.
///
/// `value` is NaN when every sub-period of the group was null.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceYearAggregate {
    pub province: String,
    pub year: i32,
    pub value: f64,
}

/// Run the full filter → expand → aggregate pipeline.
///
/// Pure apart from data-quality warnings; the output is sorted by
/// (province, year), so repeat runs over the same input are bit-identical.
#[tracing::instrument(level = "info", skip(records), fields(records = records.len()))]
pub fn reshape(records: &[RawRecord]) -> Vec<ProvinceYearAggregate> {
    let rows = expand(records);
    let aggregates = aggregate(&rows);
    info!(
        rows = rows.len(),
        aggregates = aggregates.len(),
        "reshaped source records"
    );
    aggregates
}

/// Filter to the target series and unpivot: one `ProvinceYearRow` per entry in
/// each surviving record's periods list, in source order.
///
/// Records whose metadata carries no province entry are dropped with a
/// warning: a null group key would only corrupt the downstream join.
pub fn expand(records: &[RawRecord]) -> Vec<ProvinceYearRow> {
    let mut rows = Vec::new();
    for record in records {
        if !TARGET_LABEL.is_match(&record.label) {
            continue;
        }
        let Some(province) = province_of(&record.metadata) else {
            warn!(label = %record.label, "record has no province descriptor; dropped");
            continue;
        };
        debug!(province, periods = record.periods.len(), "expanding record");
        for period in &record.periods {
            rows.push(ProvinceYearRow {
                province: province.to_string(),
                sub_period: period.sub_period.clone(),
                year: period.year,
                value: period.value,
            });
        }
    }
    rows
}

/// Group by (province, year) and take the arithmetic mean of the present
/// values. A group whose values are all null yields NaN rather than an error.
pub fn aggregate(rows: &[ProvinceYearRow]) -> Vec<ProvinceYearAggregate> {
    // (sum of present values, present count); BTreeMap for deterministic order
    let mut groups: BTreeMap<(&str, i32), (f64, u32)> = BTreeMap::new();
    for row in rows {
        let entry = groups
            .entry((row.province.as_str(), row.year))
            .or_insert((0.0, 0));
        if let Some(v) = row.value {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .map(|((province, year), (sum, count))| ProvinceYearAggregate {
            province: province.to_string(),
            year,
            value: if count > 0 {
                sum / f64::from(count)
            } else {
                f64::NAN
            },
        })
        .collect()
}

/// First metadata entry describing a province, if any.
fn province_of(metadata: &[MetaEntry]) -> Option<&str> {
    metadata
        .iter()
        .find(|m| m.variable_kind == PROVINCE_VARIABLE)
        .map(|m| m.name.as_str())
}
