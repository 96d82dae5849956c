//! Single raster retrieval: one `GetCoverage` call, one normalized table.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::client::Transport;
use crate::decode::RasterDecoder;
use crate::error::{Error, Result};
use crate::model::Domain;
use crate::util::format_coordinate;

/// Decoder artefacts dropped before looking for the measurement column.
const DROPPED_COLUMNS: &[&str] = &["surface", "valid_time"];
/// Level columns, folded into the measurement name then dropped.
const LEVEL_COLUMNS: &[&str] = &[
    "isobaricInhPa",
    "heightAboveGround",
    "meanSea",
    "potentialVorticity",
];
const KEY_COLUMNS: &[&str] = &["latitude", "longitude", "run", "forecast_horizon"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RasterFormat {
    #[default]
    Grib,
    Tiff,
}

impl RasterFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterFormat::Grib => "application/wmo-grib",
            RasterFormat::Tiff => "image/tiff",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Grib => "grib",
            RasterFormat::Tiff => "tiff",
        }
    }
}

/// One fully specified raster slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRequest {
    pub coverage_id: String,
    /// Meters above ground, `None` for no height subset.
    pub height: Option<i64>,
    /// hPa, `None` for no pressure subset.
    pub pressure: Option<i64>,
    /// Hours after the run.
    pub forecast_horizon: i64,
    pub lat: (f64, f64),
    pub long: (f64, f64),
    pub format: RasterFormat,
}

impl CoverageRequest {
    pub fn forecast_horizon_seconds(&self) -> i64 {
        self.forecast_horizon * 3600
    }

    /// `subset` values in request order: pressure, height, time, lat, long.
    pub fn subset_clauses(&self) -> Vec<String> {
        let mut clauses = Vec::with_capacity(5);
        if let Some(pressure) = self.pressure {
            clauses.push(format!("pressure({})", pressure));
        }
        if let Some(height) = self.height {
            clauses.push(format!("height({})", height));
        }
        clauses.push(format!("time({})", self.forecast_horizon_seconds()));
        clauses.push(format!(
            "lat({},{})",
            format_coordinate(self.lat.0),
            format_coordinate(self.lat.1)
        ));
        clauses.push(format!(
            "long({},{})",
            format_coordinate(self.long.0),
            format_coordinate(self.long.1)
        ));
        clauses
    }

    pub(crate) fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("service", "WCS".to_string()),
            ("version", "2.0.1".to_string()),
            ("coverageid", self.coverage_id.clone()),
            ("format", self.format.mime_type().to_string()),
        ];
        params.extend(self.subset_clauses().into_iter().map(|c| ("subset", c)));
        params
    }

    /// `{dir}/{coverage_id}/{height}m_{seconds}Z_{lat0}-{lat1}_{long0}-{long1}.{ext}`,
    /// with `_` standing for a missing (or zero) height.
    pub fn cache_path(&self, dir: &Path) -> PathBuf {
        let height = self
            .height
            .filter(|h| *h != 0)
            .map(|h| h.to_string())
            .unwrap_or_else(|| "_".to_string());
        let filename = format!(
            "{}m_{}Z_{}-{}_{}-{}.{}",
            height,
            self.forecast_horizon_seconds(),
            format_coordinate(self.lat.0),
            format_coordinate(self.lat.1),
            format_coordinate(self.long.0),
            format_coordinate(self.long.1),
            self.format.extension()
        );
        dir.join(&self.coverage_id).join(filename)
    }
}

/// Where a raster landed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFile {
    pub path: PathBuf,
    pub was_cache_hit: bool,
}

/// Downloads the raster of `request` under `cache_dir`, reusing an existing file.
pub fn fetch_coverage_file<T: Transport + ?Sized>(
    transport: &T,
    domain: &Domain,
    request: &CoverageRequest,
    cache_dir: &Path,
) -> Result<RasterFile> {
    let path = request.cache_path(cache_dir);
    debug!(path = %path.display(), "raster cache path");

    if path.exists() {
        info!(path = %path.display(), "reusing cached raster");
        return Ok(RasterFile {
            path,
            was_cache_hit: true,
        });
    }

    debug!(coverage_id = %request.coverage_id, "raster not cached, fetching");
    let response = transport.get(&domain.operation_path("GetCoverage"), &request.query_params())?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, response.bytes())?;

    Ok(RasterFile {
        path,
        was_cache_hit: false,
    })
}

/// Deletes a decoded raster and the `{file}.*.idx` index files next to it.
pub(crate) fn remove_raster(path: &Path) -> Result<()> {
    fs::remove_file(path)?;

    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(());
    };
    let prefix = format!("{}.", name.to_string_lossy());
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(&prefix) && file_name.ends_with(".idx") {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "failed to remove index file");
            }
        }
    }
    Ok(())
}

/// Fetches, decodes and normalizes one raster slice.
pub fn fetch_coverage<T, D>(
    transport: &T,
    decoder: &D,
    domain: &Domain,
    request: &CoverageRequest,
    cache_dir: &Path,
) -> Result<DataFrame>
where
    T: Transport + ?Sized,
    D: RasterDecoder + ?Sized,
{
    let raster = fetch_coverage_file(transport, domain, request, cache_dir)?;
    let decoded = match decoder.decode(&raster.path) {
        Ok(df) => df,
        Err(e) => {
            if let Err(cleanup) = remove_raster(&raster.path) {
                warn!(path = %raster.path.display(), error = %cleanup, "failed to remove raster");
            }
            return Err(e);
        }
    };
    remove_raster(&raster.path)?;
    normalize_frame(decoded, &request.coverage_id)
}

/// Lowercase initials of the indicator tokens, `TOTAL_WATER_PRECIPITATION__...` → `twp`.
pub(crate) fn indicator_initials(coverage_id: &str) -> String {
    coverage_id
        .split("__")
        .next()
        .unwrap_or("")
        .split('_')
        .filter_map(|word| word.chars().next())
        .collect::<String>()
        .to_lowercase()
}

/// Keeps what precedes the first digit, `t2m` → `t`.
pub(crate) fn strip_level_digits(name: &str) -> &str {
    match name.find(|c: char| c.is_ascii_digit()) {
        Some(i) => &name[..i],
        None => name,
    }
}

fn first_level(df: &DataFrame, column: &str) -> Result<Option<i64>> {
    if df.height() == 0 {
        return Ok(None);
    }
    let value = df.column(column)?.get(0)?;
    value.extract::<i64>().map(Some).ok_or_else(|| {
        Error::Decode(format!("`{}` holds a non-numeric level: {}", column, value))
    })
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Renames decoder columns to `run` / `forecast_horizon` and the single
/// measurement column to `{base}{_Nm|_Nhpa|}`.
pub fn normalize_frame(mut df: DataFrame, coverage_id: &str) -> Result<DataFrame> {
    for column in DROPPED_COLUMNS {
        if has_column(&df, column) {
            df = df.drop(column)?;
        }
    }
    if has_column(&df, "time") {
        df.rename("time", "run".into())?;
    }
    if has_column(&df, "step") {
        df.rename("step", "forecast_horizon".into())?;
    }

    let candidates: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .filter(|c| !KEY_COLUMNS.contains(&c.as_str()) && !LEVEL_COLUMNS.contains(&c.as_str()))
        .collect();
    if candidates.len() != 1 {
        return Err(Error::AmbiguousMeasurement {
            coverage_id: coverage_id.to_string(),
            candidates,
        });
    }
    let measurement = &candidates[0];

    let base_name = if measurement == "unknown" {
        indicator_initials(coverage_id)
    } else {
        strip_level_digits(measurement).to_string()
    };

    let suffix = if has_column(&df, "heightAboveGround") {
        first_level(&df, "heightAboveGround")?
            .map(|h| format!("_{}m", h))
            .unwrap_or_default()
    } else if has_column(&df, "isobaricInhPa") {
        first_level(&df, "isobaricInhPa")?
            .map(|p| format!("_{}hpa", p))
            .unwrap_or_default()
    } else {
        String::new()
    };

    let name = format!("{}{}", base_name, suffix);
    debug!(coverage_id, from = %measurement, to = %name, "measurement column");
    df.rename(measurement, name.into())?;

    for column in LEVEL_COLUMNS {
        if has_column(&df, column) {
            df = df.drop(column)?;
        }
    }
    Ok(df)
}
