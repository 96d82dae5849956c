//! Single-indicator retrieval over several heights, pressures and horizons.

use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use tracing::info;

use crate::client::Transport;
use crate::decode::RasterDecoder;
use crate::error::{Error, Result};
use crate::fetch::CoverageRequest;
use crate::forecast::Forecast;
use crate::model::{FRANCE_METRO_LATITUDES, FRANCE_METRO_LONGITUDES};

/// What to fetch with [`Forecast::get_coverage`].
///
/// Exactly one of `indicator` / `coverage_id` must be set. Empty level or
/// horizon lists mean "first available value".
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageQuery {
    pub indicator: Option<String>,
    pub coverage_id: Option<String>,
    pub lat: (f64, f64),
    pub long: (f64, f64),
    pub heights: Vec<i64>,
    pub pressures: Vec<i64>,
    pub forecast_horizons: Vec<i64>,
    pub run: Option<String>,
    pub interval: Option<String>,
}

impl Default for CoverageQuery {
    fn default() -> Self {
        Self {
            indicator: None,
            coverage_id: None,
            lat: FRANCE_METRO_LATITUDES,
            long: FRANCE_METRO_LONGITUDES,
            heights: Vec::new(),
            pressures: Vec::new(),
            forecast_horizons: Vec::new(),
            run: None,
            interval: None,
        }
    }
}

impl CoverageQuery {
    pub fn indicator(indicator: impl Into<String>) -> Self {
        Self {
            indicator: Some(indicator.into()),
            ..Self::default()
        }
    }

    pub fn coverage_id(coverage_id: impl Into<String>) -> Self {
        Self {
            coverage_id: Some(coverage_id.into()),
            ..Self::default()
        }
    }

    pub fn with_lat(mut self, lat: (f64, f64)) -> Self {
        self.lat = lat;
        self
    }

    pub fn with_long(mut self, long: (f64, f64)) -> Self {
        self.long = long;
        self
    }

    pub fn with_heights(mut self, heights: impl Into<Vec<i64>>) -> Self {
        self.heights = heights.into();
        self
    }

    pub fn with_pressures(mut self, pressures: impl Into<Vec<i64>>) -> Self {
        self.pressures = pressures.into();
        self
    }

    pub fn with_forecast_horizons(mut self, horizons: impl Into<Vec<i64>>) -> Self {
        self.forecast_horizons = horizons.into();
        self
    }

    pub fn with_run(mut self, run: impl Into<String>) -> Self {
        self.run = Some(run.into());
        self
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }
}

/// Checks `requested` against the axis, or picks its first value.
///
/// `None` stands for "no subset": the axis does not exist for the coverage.
pub(crate) fn validate_or_default(
    param: &'static str,
    requested: &[i64],
    available: &[i64],
) -> Result<Vec<Option<i64>>> {
    if !requested.is_empty() {
        if requested.iter().any(|v| !available.contains(v)) {
            return Err(Error::InvalidAxisValue {
                param,
                requested: requested.to_vec(),
                available: available.to_vec(),
            });
        }
        return Ok(requested.iter().copied().map(Some).collect());
    }

    match available.first() {
        Some(first) => {
            info!(param, value = first, "using first available value");
            Ok(vec![Some(*first)])
        }
        None => Ok(vec![None]),
    }
}

/// Row-wise concatenation; differing measurement columns are filled with nulls.
pub(crate) fn concat_frames(frames: Vec<DataFrame>) -> Result<DataFrame> {
    if frames.len() <= 1 {
        return Ok(frames.into_iter().next().unwrap_or_else(DataFrame::empty));
    }
    let lazy: Vec<LazyFrame> = frames.into_iter().map(|df| df.lazy()).collect();
    Ok(concat_lf_diagonal(lazy, UnionArgs::default())?.collect()?)
}

fn fetch_progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} {pos}/{len} rasters {wide_bar} {eta} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

impl<T: Transport, D: RasterDecoder> Forecast<T, D> {
    /// Fetches one indicator (or coverage id) for every combination of
    /// forecast horizon, pressure and height, in that nesting order.
    pub fn get_coverage(&self, query: &CoverageQuery) -> Result<DataFrame> {
        let indicator = query.indicator.as_deref().filter(|i| !i.is_empty());
        let coverage_id = query.coverage_id.as_deref().filter(|id| !id.is_empty());
        let coverage_id = match (indicator, coverage_id) {
            (Some(indicator), None) => self.resolve_coverage_id(
                indicator,
                query.run.as_deref(),
                query.interval.as_deref(),
            )?,
            (None, Some(id)) => id.to_string(),
            _ => {
                return Err(Error::AmbiguousTarget {
                    indicator: query.indicator.clone(),
                    coverage_id: query.coverage_id.clone(),
                });
            }
        };

        let axis = self.get_coverage_description(&coverage_id)?;
        let heights = validate_or_default("heights", &query.heights, &axis.heights)?;
        let pressures = validate_or_default("pressures", &query.pressures, &axis.pressures)?;
        let horizons = validate_or_default(
            "forecast_horizons",
            &query.forecast_horizons,
            &axis.forecast_horizons,
        )?;

        let dir = self.cache_dir()?;
        let total = horizons.len() * pressures.len() * heights.len();
        let pb = self.progress.then(|| fetch_progress(total as u64));

        let mut frames = Vec::with_capacity(total);
        for horizon in &horizons {
            for pressure in &pressures {
                for height in &heights {
                    let request = CoverageRequest {
                        coverage_id: coverage_id.clone(),
                        height: *height,
                        pressure: *pressure,
                        forecast_horizon: horizon.unwrap_or(0),
                        lat: query.lat,
                        long: query.long,
                        format: self.format,
                    };
                    if let Some(pb) = &pb {
                        pb.set_message(format!("{}h", request.forecast_horizon));
                    }
                    frames.push(self.fetch_single(&request, &dir)?);
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                }
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        concat_frames(frames)
    }
}
