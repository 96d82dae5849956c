use chrono::NaiveDateTime;
use tracing::info;

use crate::catalog::{Catalog, CoverageId};
use crate::error::{Error, Result};
use crate::model::Model;

/// Run timestamp layout used by coverage identifiers.
pub const RUN_FORMAT: &str = "%Y-%m-%dT%H.%M.%SZ";

/// Interval used for aggregated indicators when none is given.
pub const DEFAULT_INTERVAL: &str = "P1D";

pub(crate) fn check_run_format(run: &str) -> Result<()> {
    NaiveDateTime::parse_from_str(run, RUN_FORMAT)
        .map(|_| ())
        .map_err(|_| Error::InvalidRunFormat(run.to_string()))
}

/// Builds the coverage id of `indicator` at `run` (latest published run when
/// `None`) aggregated over `interval` (`P1D` for aggregated indicators when
/// `None`).
pub fn resolve_coverage_id(
    catalog: &Catalog,
    model: Model,
    indicator: &str,
    run: Option<&str>,
    interval: Option<&str>,
) -> Result<String> {
    if !model.is_known_indicator(indicator) {
        return Err(Error::UnknownIndicator {
            indicator: indicator.to_string(),
            model: model.to_string(),
        });
    }

    let run = match run {
        Some(run) => run.to_string(),
        None => {
            let latest = catalog.latest_run(indicator).ok_or_else(|| Error::InvalidRun {
                indicator: indicator.to_string(),
                run: "<latest>".to_string(),
                valid: Vec::new(),
            })?;
            info!(indicator, run = latest, "using latest run");
            latest.to_string()
        }
    };

    check_run_format(&run)?;

    let valid_runs = catalog.runs(indicator);
    if !valid_runs.contains(&run) {
        return Err(Error::InvalidRun {
            indicator: indicator.to_string(),
            run,
            valid: valid_runs,
        });
    }

    let interval = if model.is_instant_indicator(indicator) {
        if let Some(interval) = interval {
            return Err(Error::UnexpectedInterval {
                indicator: indicator.to_string(),
                interval: interval.to_string(),
            });
        }
        None
    } else {
        match interval {
            None => {
                info!(indicator, interval = DEFAULT_INTERVAL, "using default interval");
                Some(DEFAULT_INTERVAL)
            }
            Some(interval) => {
                let valid = catalog.intervals(indicator);
                if !valid.iter().any(|v| v == interval) {
                    return Err(Error::InvalidInterval {
                        indicator: indicator.to_string(),
                        interval: interval.to_string(),
                        valid,
                    });
                }
                Some(interval)
            }
        }
    };

    Ok(CoverageId::new(indicator, &run, interval).to_string())
}
