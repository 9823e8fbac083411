use anyhow::Result;
use paromap::{geo, ingest, render, reshape};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

// One-shot batch: paths are fixed, there are no flags and no state.
const DATASET_PATH: &str = "Datos.json";
const BOUNDARIES_PATH: &str = "spain.geojson";
const OUTPUT_PATH: &str = "mapa_paro.html";

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) ingest the unemployment dataset ──────────────────────────
    let records = ingest::load_records(DATASET_PATH)?;

    // ─── 3) reshape to one annual mean per province ──────────────────
    let aggregates = reshape::reshape(&records);
    if aggregates.is_empty() {
        warn!("no records matched the unemployment-rate series; map will be empty");
    }

    // ─── 4) load boundaries and audit the join ───────────────────────
    let boundaries = geo::load_boundaries(BOUNDARIES_PATH)?;
    let mismatches = geo::audit_join(&boundaries, &aggregates);
    if mismatches > 0 {
        warn!(mismatches, "some provinces will render unfilled");
    }

    // ─── 5) render the animated choropleth ───────────────────────────
    let figure = render::build_figure(&boundaries, &aggregates)?;
    render::write_page(OUTPUT_PATH, &figure)?;

    info!("all done");
    Ok(())
}
