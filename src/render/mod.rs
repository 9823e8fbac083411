// src/render/mod.rs
//
// Turns the aggregate table into an interactive choropleth: one mapbox trace
// per year, years as animation frames behind a slider. The figure is plain
// plotly.js JSON; the page just loads it from the CDN and boots the plot.
use anyhow::{Context, Result};
use chrono::Local;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde_json::{json, Value};
use std::{fs, path::Path};
use tracing::info;

use crate::geo::BoundarySet;
use crate::reshape::ProvinceYearAggregate;

const TITLE: &str = "Mapa Tasa d'Atur per Província";
const VALUE_LABEL: &str = "Taxa d'atur";

const SPAIN_CENTER_LAT: f64 = 36.234_410;
const SPAIN_CENTER_LON: f64 = -4.884_160;
const ZOOM: f64 = 4.0;
const MAPBOX_STYLE: &str = "carto-darkmatter";

/// Fixed color range for the unemployment rate, in percent.
const RANGE_COLOR: [f64; 2] = [0.0, 40.0];

/// CARTO Brwnyl sequential scale, spelled out as explicit stops; plotly.js has
/// no built-in scale by that name.
const BRWNYL: [(f64, &str); 7] = [
    (0.0, "#ede5cf"),
    (0.167, "#e0c2a2"),
    (0.333, "#d39c83"),
    (0.5, "#c1766f"),
    (0.667, "#a65461"),
    (0.833, "#813753"),
    (1.0, "#541f3f"),
];

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.32.0.min.js";

/// Build the plotly figure: `{ data, layout, frames }`.
///
/// Frames are sorted by year; rows whose mean is NaN (all-null groups) are
/// skipped, since JSON cannot carry NaN and plotly would choke on it. An empty
/// aggregate table yields a figure with zero frames, not an error.
#[tracing::instrument(level = "info", skip_all, fields(aggregates = aggregates.len()))]
pub fn build_figure(
    boundaries: &BoundarySet,
    aggregates: &[ProvinceYearAggregate],
) -> Result<Value> {
    let geojson = feature_collection(boundaries);

    let years = {
        let mut ys: Vec<i32> = aggregates.iter().map(|a| a.year).collect();
        ys.sort_unstable();
        ys.dedup();
        ys
    };

    let frames: Vec<Value> = years
        .iter()
        .map(|&year| {
            json!({
                "name": year.to_string(),
                "data": [trace_for_year(&geojson, aggregates, year)],
            })
        })
        .collect();

    let slider_steps: Vec<Value> = years
        .iter()
        .map(|&year| {
            json!({
                "label": year.to_string(),
                "method": "animate",
                "args": [
                    [year.to_string()],
                    {
                        "frame": { "duration": 500, "redraw": true },
                        "mode": "immediate",
                        "transition": { "duration": 300 },
                    }
                ],
            })
        })
        .collect();

    let colorscale: Vec<Value> = BRWNYL
        .iter()
        .map(|&(stop, color)| json!([stop, color]))
        .collect();

    // the initial view shows the first year; the frames drive the rest
    let data: Vec<Value> = match years.first() {
        Some(&first) => vec![trace_for_year(&geojson, aggregates, first)],
        None => Vec::new(),
    };
    let data: Vec<Value> = data
        .into_iter()
        .map(|mut trace| {
            trace["colorscale"] = Value::Array(colorscale.clone());
            trace["zmin"] = json!(RANGE_COLOR[0]);
            trace["zmax"] = json!(RANGE_COLOR[1]);
            trace["colorbar"] = json!({ "title": { "text": VALUE_LABEL } });
            trace
        })
        .collect();

    let layout = json!({
        "title": { "text": TITLE },
        "mapbox": {
            "style": MAPBOX_STYLE,
            "zoom": ZOOM,
            "center": { "lat": SPAIN_CENTER_LAT, "lon": SPAIN_CENTER_LON },
        },
        "margin": { "l": 0, "r": 0, "t": 40, "b": 0 },
        "sliders": [{
            "active": 0,
            "currentvalue": { "prefix": "Any: " },
            "pad": { "t": 30 },
            "steps": slider_steps,
        }],
        "updatemenus": [{
            "type": "buttons",
            "direction": "left",
            "pad": { "r": 10, "t": 50 },
            "x": 0.1,
            "y": 0.0,
            "buttons": [
                {
                    "label": "▶",
                    "method": "animate",
                    "args": [Value::Null, {
                        "frame": { "duration": 500, "redraw": true },
                        "fromcurrent": true,
                        "transition": { "duration": 300 },
                    }],
                },
                {
                    "label": "❚❚",
                    "method": "animate",
                    "args": [[Value::Null], {
                        "frame": { "duration": 0, "redraw": false },
                        "mode": "immediate",
                    }],
                },
            ],
        }],
    });

    info!(frames = frames.len(), "built choropleth figure");
    Ok(json!({ "data": data, "layout": layout, "frames": frames }))
}

/// Write the interactive page and log its location.
pub fn write_page<P: AsRef<Path>>(path: P, figure: &Value) -> Result<()> {
    let path = path.as_ref();
    let page = page(figure);
    fs::write(path, page.into_string())
        .with_context(|| format!("Failed to write map page {}", path.display()))?;
    info!(path = %path.display(), "wrote choropleth page");
    Ok(())
}

/// Reassemble the typed boundary set into the GeoJSON the trace embeds.
fn feature_collection(boundaries: &BoundarySet) -> Value {
    let features: Vec<Value> = boundaries
        .features
        .iter()
        .map(|f| {
            json!({
                "type": "Feature",
                "properties": { "name": f.properties.name },
                "geometry": f.geometry,
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// One choroplethmapbox trace for the given year. Locations are province
/// names, matched against the features' `properties.name`.
fn trace_for_year(geojson: &Value, aggregates: &[ProvinceYearAggregate], year: i32) -> Value {
    let mut locations = Vec::new();
    let mut z = Vec::new();
    for agg in aggregates {
        if agg.year == year && agg.value.is_finite() {
            locations.push(agg.province.clone());
            z.push(agg.value);
        }
    }
    json!({
        "type": "choroplethmapbox",
        "geojson": geojson,
        "featureidkey": "properties.name",
        "locations": locations,
        "z": z,
        "name": year.to_string(),
    })
}

fn page(figure: &Value) -> Markup {
    let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    html! {
        (DOCTYPE)
        html lang="es" {
            head {
                meta charset="utf-8";
                title { (TITLE) }
                script src=(PLOTLY_CDN) {}
                style {
                    (PreEscaped("html, body { margin: 0; height: 100%; background: #111; } #map { width: 100%; height: 100%; } .stamp { position: fixed; right: 8px; bottom: 6px; color: #777; font: 11px sans-serif; }"))
                }
            }
            body {
                div id="map" {}
                div class="stamp" { "Generado " (generated) }
                script {
                    (PreEscaped(format!(
                        "var fig = {figure};\nPlotly.newPlot('map', fig.data, fig.layout).then(function () {{\n  if (fig.frames.length > 0) {{ Plotly.addFrames('map', fig.frames); }}\n}});"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn boundaries() -> BoundarySet {
        serde_json::from_str(
            r#"{ "features": [
                { "properties": { "name": "Madrid" },
                  "geometry": { "type": "Polygon", "coordinates": [[[ -3.7, 40.4 ], [ -3.6, 40.4 ], [ -3.6, 40.5 ], [ -3.7, 40.4 ]]] } }
            ] }"#,
        )
        .unwrap()
    }

    fn agg(province: &str, year: i32, value: f64) -> ProvinceYearAggregate {
        ProvinceYearAggregate {
            province: province.into(),
            year,
            value,
        }
    }

    #[test]
    fn one_frame_per_year_sorted() -> Result<()> {
        let aggregates = vec![
            agg("Madrid", 2021, 12.0),
            agg("Madrid", 2019, 14.0),
            agg("Madrid", 2020, 13.0),
        ];
        let fig = build_figure(&boundaries(), &aggregates)?;

        let frames = fig["frames"].as_array().unwrap();
        let names: Vec<&str> = frames.iter().map(|f| f["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["2019", "2020", "2021"]);

        let steps = fig["layout"]["sliders"][0]["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0]["label"], "2019");
        Ok(())
    }

    #[test]
    fn initial_trace_carries_fixed_color_range() -> Result<()> {
        let fig = build_figure(&boundaries(), &[agg("Madrid", 2020, 13.0)])?;

        let trace = &fig["data"][0];
        assert_eq!(trace["type"], "choroplethmapbox");
        assert_eq!(trace["featureidkey"], "properties.name");
        assert_eq!(trace["zmin"], 0.0);
        assert_eq!(trace["zmax"], 40.0);
        assert_eq!(trace["locations"][0], "Madrid");
        assert_eq!(trace["z"][0], 13.0);
        Ok(())
    }

    #[test]
    fn nan_aggregates_are_skipped() -> Result<()> {
        let aggregates = vec![agg("Madrid", 2020, f64::NAN), agg("Sevilla", 2020, 21.0)];
        let fig = build_figure(&boundaries(), &aggregates)?;

        let trace = &fig["frames"][0]["data"][0];
        assert_eq!(trace["locations"].as_array().unwrap().len(), 1);
        assert_eq!(trace["locations"][0], "Sevilla");
        Ok(())
    }

    #[test]
    fn empty_table_yields_empty_figure() -> Result<()> {
        let fig = build_figure(&boundaries(), &[])?;
        assert!(fig["frames"].as_array().unwrap().is_empty());
        assert!(fig["data"].as_array().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn page_embeds_figure_and_bootstrap() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("mapa.html");
        let fig = build_figure(&boundaries(), &[agg("Madrid", 2020, 13.0)])?;

        write_page(&out, &fig)?;
        let html = fs::read_to_string(&out)?;
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains("choroplethmapbox"));
        assert!(html.contains(TITLE));
        Ok(())
    }
}
