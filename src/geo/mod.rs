// src/geo/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashSet, fs::File, io::BufReader, path::Path};
use tracing::{info, warn};

use crate::reshape::ProvinceYearAggregate;

/// The province boundary polygons, as a GeoJSON FeatureCollection.
///
/// Geometry is carried opaquely: the renderer embeds it verbatim into the
/// figure, so there is no reason to interpret coordinates here.
#[derive(Debug, Deserialize)]
pub struct BoundarySet {
    pub features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
pub struct Feature {
    pub properties: FeatureProperties,
    pub geometry: Value,
}

/// `properties.name` is the join key against the aggregate table's province
/// column; the match is exact, case- and accent-sensitive.
#[derive(Debug, Deserialize)]
pub struct FeatureProperties {
    pub name: String,
}

impl BoundarySet {
    pub fn province_names(&self) -> HashSet<&str> {
        self.features
            .iter()
            .map(|f| f.properties.name.as_str())
            .collect()
    }
}

/// Read the boundary file once at startup. A collection without features or a
/// feature without a name property is a fatal input-format error.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_boundaries<P: AsRef<Path>>(path: P) -> Result<BoundarySet> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open boundary file {}", path.display()))?;
    let boundaries: BoundarySet = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed boundary file {}", path.display()))?;
    info!(features = boundaries.features.len(), "loaded boundaries");
    Ok(boundaries)
}

/// Warn about aggregate provinces with no boundary feature: they would render
/// as unfilled holes on the map. Not fatal, but worth surfacing.
/// Returns the number of distinct mismatched province names.
pub fn audit_join(boundaries: &BoundarySet, aggregates: &[ProvinceYearAggregate]) -> usize {
    let known = boundaries.province_names();
    let mut missing: Vec<&str> = aggregates
        .iter()
        .map(|a| a.province.as_str())
        .filter(|p| !known.contains(p))
        .collect();
    missing.sort_unstable();
    missing.dedup();

    for province in &missing {
        warn!(province, "no boundary feature matches this province");
    }
    missing.len()
}
