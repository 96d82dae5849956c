//! Raster payload decoding.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use grib::codetables::grib2::*;
use grib::codetables::*;
use grib::{ForecastTime, Name};
use polars::prelude::{Column, DataFrame};
use tracing::debug;

use crate::error::{Error, Result};

/// Turns a downloaded raster file into one row per grid point.
///
/// The frame carries `latitude`, `longitude`, `time` (run), `step` (hours),
/// an optional level column (`heightAboveGround`, `isobaricInhPa`, ...) and
/// one measurement column.
pub trait RasterDecoder {
    fn decode(&self, path: &Path) -> Result<DataFrame>;
}

impl<D: RasterDecoder + ?Sized> RasterDecoder for &D {
    fn decode(&self, path: &Path) -> Result<DataFrame> {
        (**self).decode(path)
    }
}

/// GRIB2 decoder built on the `grib` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GribDecoder;

impl RasterDecoder for GribDecoder {
    fn decode(&self, path: &Path) -> Result<DataFrame> {
        let f = BufReader::new(File::open(path)?);
        let grib2 = grib::from_reader(f)?;

        let mut frame: Option<DataFrame> = None;
        for (index, submessage) in grib2.iter() {
            let discipline = submessage.indicator().discipline;
            let prod_def = submessage.prod_def();
            let name = match (prod_def.parameter_category(), prod_def.parameter_number()) {
                (Some(category), Some(number)) => short_name(discipline, category, number),
                _ => "unknown",
            };

            let t = submessage.identification().ref_time_unchecked();
            let run = format_run(t.year, t.month, t.day, t.hour, t.minute, t.second);
            let reference = NaiveDate::from_ymd_opt(t.year.into(), t.month.into(), t.day.into())
                .and_then(|d| d.and_hms_opt(t.hour.into(), t.minute.into(), t.second.into()));

            let section: Vec<u8> = prod_def.iter().copied().collect();
            let interval_end = reference
                .and_then(|r| statistical_end_step(&section, prod_def.prod_tmpl_num(), r));
            let step = match interval_end.or_else(|| start_step(prod_def.forecast_time())) {
                Some(step) => step,
                None => {
                    return Err(Error::Decode(format!(
                        "submessage {:?}: unsupported forecast time {:?}",
                        index,
                        prod_def.forecast_time()
                    )));
                }
            };
            let level = prod_def
                .fixed_surfaces()
                .and_then(|(first, _)| level_column(first.surface_type, first.value()));

            let (latitudes, longitudes): (Vec<f64>, Vec<f64>) = submessage
                .latlons()?
                .map(|(lat, lon)| (f64::from(lat), f64::from(lon)))
                .unzip();
            let values: Vec<f64> = grib::Grib2SubmessageDecoder::from(submessage)?
                .dispatch()?
                .map(f64::from)
                .collect();

            if values.len() != latitudes.len() {
                return Err(Error::Decode(format!(
                    "submessage {:?}: {} values for {} grid points",
                    index,
                    values.len(),
                    latitudes.len()
                )));
            }
            debug!(
                submessage = ?index,
                parameter = name,
                step,
                points = values.len(),
                "decoded submessage"
            );

            let n = values.len();
            let mut columns = vec![
                Column::new("latitude".into(), latitudes),
                Column::new("longitude".into(), longitudes),
                Column::new("time".into(), vec![run.as_str(); n]),
                Column::new("step".into(), vec![step; n]),
            ];
            match level {
                Some((column, LevelValue::Int(v))) => {
                    columns.push(Column::new(column.into(), vec![v; n]))
                }
                Some((column, LevelValue::Float(v))) => {
                    columns.push(Column::new(column.into(), vec![v; n]))
                }
                None => {}
            }
            columns.push(Column::new(name.into(), values));

            let part = DataFrame::new(columns)?;
            match frame.as_mut() {
                Some(df) => {
                    df.vstack_mut(&part)?;
                }
                None => frame = Some(part),
            }
        }

        frame.ok_or_else(|| Error::Decode(format!("{} holds no GRIB2 submessage", path.display())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LevelValue {
    Int(i64),
    Float(f64),
}

/// Level column for a first fixed surface (Code Table 4.5).
pub(crate) fn level_column(surface_type: u8, value: f64) -> Option<(&'static str, LevelValue)> {
    match surface_type {
        1 => Some(("surface", LevelValue::Float(value))),
        100 => Some(("isobaricInhPa", LevelValue::Int((value / 100.0).round() as i64))),
        101 => Some(("meanSea", LevelValue::Float(value))),
        103 => Some(("heightAboveGround", LevelValue::Int(value.round() as i64))),
        109 => Some(("potentialVorticity", LevelValue::Float(value))),
        _ => None,
    }
}

/// Short names of the parameters served by the AROME/ARPEGE coverages
/// (discipline, category, number). Unlisted parameters are `unknown`.
pub(crate) fn short_name(discipline: u8, category: u8, number: u8) -> &'static str {
    match (discipline, category, number) {
        (0, 0, 0) => "t",
        (0, 0, 4) => "tmax",
        (0, 0, 5) => "tmin",
        (0, 0, 6) => "dpt",
        (0, 1, 0) => "q",
        (0, 1, 1) => "r",
        (0, 1, 8) => "tp",
        (0, 2, 1) => "ws",
        (0, 2, 2) => "u",
        (0, 2, 3) => "v",
        (0, 2, 8) => "w",
        (0, 2, 10) => "absv",
        (0, 2, 14) => "pv",
        (0, 3, 0) => "sp",
        (0, 3, 1) => "prmsl",
        (0, 3, 4) => "z",
        (0, 3, 18) => "blh",
        (0, 6, 1) => "tcc",
        (0, 6, 3) => "lcc",
        (0, 6, 4) => "mcc",
        (0, 6, 5) => "hcc",
        (0, 7, 6) => "cape",
        (0, 19, 11) => "tke",
        _ => "unknown",
    }
}

/// Forecast time of an instantaneous product, in hours.
fn start_step(forecast_time: Option<ForecastTime>) -> Option<i64> {
    match forecast_time? {
        ForecastTime {
            unit: Name(Table4_4::Hour),
            value,
        } => Some(i64::from(value)),
        ForecastTime {
            unit: Name(Table4_4::Minute),
            value,
        } => Some(i64::from(value) / 60),
        ForecastTime {
            unit: Name(Table4_4::Second),
            value,
        } => Some(i64::from(value) / 3600),
        _ => None,
    }
}

/// Octet of the "end of overall time interval" year in the statistically
/// processed product templates.
fn interval_end_octet(template: u16) -> Option<usize> {
    match template {
        8 => Some(35),
        9 => Some(48),
        10 => Some(36),
        11 => Some(38),
        12 => Some(37),
        _ => None,
    }
}

/// Hours from `reference` to the end of the statistical processing interval,
/// `None` for instantaneous products.
///
/// `section` is the product definition section without its 5-byte header,
/// so octet `n` sits at index `n - 6`.
pub(crate) fn statistical_end_step(
    section: &[u8],
    template: u16,
    reference: NaiveDateTime,
) -> Option<i64> {
    let start = interval_end_octet(template)? - 6;
    let b = section.get(start..start + 7)?;
    let year = i32::from(u16::from_be_bytes([b[0], b[1]]));
    let end = NaiveDate::from_ymd_opt(year, b[2].into(), b[3].into())?
        .and_hms_opt(b[4].into(), b[5].into(), b[6].into())?;
    Some((end - reference).num_hours())
}

/// Renders a reference time in the coverage id run layout.
pub(crate) fn format_run(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}.{:02}.{:02}Z",
        year, month, day, hour, minute, second
    )
}
