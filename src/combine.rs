//! Several indicators over several runs, joined into one wide table.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::{debug, info};

use crate::assemble::{CoverageQuery, concat_frames};
use crate::client::Transport;
use crate::decode::RasterDecoder;
use crate::error::{Error, Result};
use crate::forecast::Forecast;
use crate::model::{FRANCE_METRO_LATITUDES, FRANCE_METRO_LONGITUDES};

/// Columns identifying one grid cell of one forecast.
pub const JOIN_KEYS: [&str; 4] = ["latitude", "longitude", "run", "forecast_horizon"];

const ROW_INDEX: &str = "__row_index";

/// What to fetch with [`Forecast::get_combined_coverage`].
///
/// `heights`, `pressures` and `intervals` pair positionally with
/// `indicator_names`; repeat an indicator to get it at several levels.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedQuery {
    pub indicator_names: Vec<String>,
    pub runs: Vec<String>,
    pub heights: Option<Vec<Option<i64>>>,
    pub pressures: Option<Vec<Option<i64>>>,
    pub intervals: Option<Vec<Option<String>>>,
    pub lat: (f64, f64),
    pub long: (f64, f64),
    /// Empty: the smallest horizon shared by the coverages of the first run.
    pub forecast_horizons: Vec<i64>,
}

impl CombinedQuery {
    pub fn new<I, S, R, Q>(indicator_names: I, runs: R) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        Self {
            indicator_names: indicator_names.into_iter().map(Into::into).collect(),
            runs: runs.into_iter().map(Into::into).collect(),
            heights: None,
            pressures: None,
            intervals: None,
            lat: FRANCE_METRO_LATITUDES,
            long: FRANCE_METRO_LONGITUDES,
            forecast_horizons: Vec::new(),
        }
    }

    pub fn with_heights<I, H>(mut self, heights: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Option<i64>>,
    {
        self.heights = Some(heights.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pressures<I, P>(mut self, pressures: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Option<i64>>,
    {
        self.pressures = Some(pressures.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_intervals<I>(mut self, intervals: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.intervals = Some(intervals.into_iter().collect());
        self
    }

    pub fn with_lat(mut self, lat: (f64, f64)) -> Self {
        self.lat = lat;
        self
    }

    pub fn with_long(mut self, long: (f64, f64)) -> Self {
        self.long = long;
        self
    }

    pub fn with_forecast_horizons(mut self, horizons: impl Into<Vec<i64>>) -> Self {
        self.forecast_horizons = horizons.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.runs.is_empty() {
            return Err(Error::InvalidParameter {
                param: "runs",
                message: "at least one run is required".into(),
            });
        }
        let mut seen = HashSet::new();
        for run in &self.runs {
            if !seen.insert(run) {
                return Err(Error::DuplicateRun(run.clone()));
            }
        }

        let expected = self.indicator_names.len();
        let lengths = [
            ("heights", self.heights.as_ref().map(Vec::len)),
            ("pressures", self.pressures.as_ref().map(Vec::len)),
            ("intervals", self.intervals.as_ref().map(Vec::len)),
        ];
        for (param, actual) in lengths {
            if let Some(actual) = actual {
                if actual != expected {
                    return Err(Error::LengthMismatch {
                        param,
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}

/// One coverage of one run with its positional level.
#[derive(Debug, Clone)]
struct Target {
    coverage_id: String,
    height: Option<i64>,
    pressure: Option<i64>,
}

/// Values present in every list, in first-list order, then sorted.
pub(crate) fn intersect_horizons(lists: &[Vec<i64>]) -> Vec<i64> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut common = first.clone();
    for times in rest {
        common.retain(|t| times.contains(t));
    }
    common.sort_unstable();
    common
}

/// Ids whose horizons do not include every requested one.
pub(crate) fn missing_horizons(
    coverage_ids: &[String],
    lists: &[Vec<i64>],
    requested: &[i64],
) -> Vec<String> {
    coverage_ids
        .iter()
        .zip(lists)
        .filter(|(_, times)| !requested.iter().all(|h| times.contains(h)))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Inner join on [`JOIN_KEYS`] that neither drops nor duplicates rows.
///
/// Left row order is kept.
pub fn join_one_to_one(left: DataFrame, right: DataFrame) -> Result<DataFrame> {
    let (left_rows, right_rows) = (left.height(), right.height());
    let keys: Vec<Expr> = JOIN_KEYS.iter().map(|k| col(*k)).collect();
    let mut args = JoinArgs::new(JoinType::Inner);
    args.validation = JoinValidation::OneToOne;

    let joined = left
        .with_row_index(ROW_INDEX.into(), None)?
        .lazy()
        .join(right.lazy(), keys.clone(), keys, args)
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()
        .map_err(|e| Error::Consistency(e.to_string()))?
        .drop(ROW_INDEX)?;

    if joined.height() != left_rows || joined.height() != right_rows {
        return Err(Error::Consistency(format!(
            "joining {} rows with {} rows produced {} rows",
            left_rows,
            right_rows,
            joined.height()
        )));
    }
    Ok(joined)
}

impl<T: Transport, D: RasterDecoder> Forecast<T, D> {
    /// Available forecast horizons of each coverage id, in input order.
    pub fn get_forecast_horizons(&self, coverage_ids: &[String]) -> Result<Vec<Vec<i64>>> {
        coverage_ids
            .iter()
            .map(|id| Ok(self.get_coverage_description(id)?.forecast_horizons))
            .collect()
    }

    /// Sorted forecast horizons shared by all `coverage_ids`.
    pub fn find_common_forecast_horizons(&self, coverage_ids: &[String]) -> Result<Vec<i64>> {
        Ok(intersect_horizons(&self.get_forecast_horizons(coverage_ids)?))
    }

    /// The coverage ids that do not offer every one of `forecast_horizons`.
    pub fn validate_forecast_horizons(
        &self,
        coverage_ids: &[String],
        forecast_horizons: &[i64],
    ) -> Result<Vec<String>> {
        let lists = self.get_forecast_horizons(coverage_ids)?;
        Ok(missing_horizons(coverage_ids, &lists, forecast_horizons))
    }

    /// Fetches every indicator of every run and joins them per run.
    ///
    /// Without explicit horizons, the smallest horizon common to the
    /// coverages of the *first* run is used for all runs.
    pub fn get_combined_coverage(&self, query: &CombinedQuery) -> Result<DataFrame> {
        query.validate()?;

        let mut horizons =
            (!query.forecast_horizons.is_empty()).then(|| query.forecast_horizons.clone());
        let mut targets_by_run: Vec<Vec<Target>> = Vec::with_capacity(query.runs.len());

        for run in &query.runs {
            let mut targets = Vec::with_capacity(query.indicator_names.len());
            for (i, indicator) in query.indicator_names.iter().enumerate() {
                let interval = query
                    .intervals
                    .as_ref()
                    .and_then(|intervals| intervals[i].as_deref());
                targets.push(Target {
                    coverage_id: self.resolve_coverage_id(indicator, Some(run), interval)?,
                    height: query.heights.as_ref().and_then(|h| h[i]),
                    pressure: query.pressures.as_ref().and_then(|p| p[i]),
                });
            }

            if horizons.is_none() {
                let ids: Vec<String> = targets.iter().map(|t| t.coverage_id.clone()).collect();
                let common = self.find_common_forecast_horizons(&ids)?;
                let first = *common
                    .first()
                    .ok_or_else(|| Error::NoCommonForecastHorizon(ids.clone()))?;
                info!(forecast_horizon = first, run = %run, "using first common forecast horizon");
                horizons = Some(vec![first]);
            }
            targets_by_run.push(targets);
        }
        let horizons = horizons.unwrap_or_default();

        let all_ids: Vec<String> = targets_by_run
            .iter()
            .flatten()
            .map(|t| t.coverage_id.clone())
            .collect();
        let invalid = self.validate_forecast_horizons(&all_ids, &horizons)?;
        if !invalid.is_empty() {
            return Err(Error::InvalidForecastHorizons {
                horizons,
                coverage_ids: invalid,
            });
        }

        let mut per_run = Vec::with_capacity(targets_by_run.len());
        for (run, targets) in query.runs.iter().zip(targets_by_run) {
            let mut joined: Option<DataFrame> = None;
            for target in targets {
                let coverage = CoverageQuery {
                    coverage_id: Some(target.coverage_id),
                    lat: query.lat,
                    long: query.long,
                    heights: target.height.into_iter().collect(),
                    pressures: target.pressure.into_iter().collect(),
                    forecast_horizons: horizons.clone(),
                    ..CoverageQuery::default()
                };
                let df = self.get_coverage(&coverage)?;
                joined = Some(match joined {
                    Some(left) => join_one_to_one(left, df)?,
                    None => df,
                });
            }
            if let Some(df) = joined {
                debug!(run = %run, rows = df.height(), columns = df.width(), "joined run");
                per_run.push(df);
            }
        }

        concat_frames(per_run)
    }
}
