// src/ingest/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::Path};
use tracing::info;

/// One record of the INE per-province export: a labelled series with its
/// descriptor metadata and the nested per-quarter observations.
///
/// Source records carry more fields than these (codes, units, scale); only the
/// ones the pipeline consumes are deserialized, the rest are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    /// Free-text series label, e.g.
    /// "Tasa de paro de la población. Total. Ambos sexos. Total. "
    #[serde(rename = "Nombre")]
    pub label: String,
    /// Descriptor entries; the one with `T3_Variable == "Provincias"` names
    /// the province.
    #[serde(rename = "MetaData")]
    pub metadata: Vec<MetaEntry>,
    /// One entry per reported sub-period (quarter).
    #[serde(rename = "Data")]
    pub periods: Vec<PeriodRecord>,
}

/// A single key/value descriptor from a record's `MetaData` list.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaEntry {
    #[serde(rename = "T3_Variable")]
    pub variable_kind: String,
    #[serde(rename = "Nombre")]
    pub name: String,
}

/// One nested observation: sub-period identifier, year and value.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodRecord {
    #[serde(rename = "T3_Periodo")]
    pub sub_period: String,
    #[serde(rename = "Anyo")]
    pub year: i32,
    /// The INE export uses JSON null for unreported quarters.
    #[serde(rename = "Valor")]
    pub value: Option<f64>,
}

/// Read and deserialize the source dataset once, at process start.
///
/// Any record missing an expected field is a fatal input-format error: this is
/// a one-shot batch run with no partial-failure tolerance, so the error chain
/// names the file and aborts the run rather than producing corrupt rows.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open dataset {}", path.display()))?;
    let records: Vec<RawRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed dataset {}", path.display()))?;
    info!(count = records.len(), "loaded source records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"[
      {
        "COD": "EPA8364",
        "Nombre": "Tasa de paro de la población. Total. Ambos sexos. Total. ",
        "T3_Unidad": "Tasa",
        "T3_Escala": "",
        "MetaData": [
          { "T3_Variable": "Provincias", "Nombre": "Madrid", "Codigo": "28" },
          { "T3_Variable": "Sexo", "Nombre": "Ambos sexos", "Codigo": "" }
        ],
        "Data": [
          { "Fecha": "2020-01-01", "T3_Periodo": "T1", "Anyo": 2020, "Valor": 10.0 },
          { "Fecha": "2020-04-01", "T3_Periodo": "T2", "Anyo": 2020, "Valor": null }
        ]
      }
    ]"#;

    #[test]
    fn parses_ine_export_shape() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(SAMPLE.as_bytes())?;

        let records = load_records(tmp.path())?;
        assert_eq!(records.len(), 1);

        let rec = &records[0];
        assert!(rec.label.starts_with("Tasa de paro"));
        assert_eq!(rec.metadata.len(), 2);
        assert_eq!(rec.metadata[0].variable_kind, "Provincias");
        assert_eq!(rec.metadata[0].name, "Madrid");

        assert_eq!(rec.periods.len(), 2);
        assert_eq!(rec.periods[0].sub_period, "T1");
        assert_eq!(rec.periods[0].year, 2020);
        assert_eq!(rec.periods[0].value, Some(10.0));
        assert_eq!(rec.periods[1].value, None);
        Ok(())
    }

    #[test]
    fn missing_field_is_fatal() -> Result<()> {
        // no "Data" field
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(br#"[{ "Nombre": "x", "MetaData": [] }]"#)?;

        let err = load_records(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Malformed dataset"));
        Ok(())
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_records("definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to open dataset"));
    }
}
