use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use meteofrance_wcs::{
    ApiResponse, Catalog, CombinedQuery, CoverageId, CoverageQuery, CoverageRequest, Domain,
    Error, Forecast, Model, RasterDecoder, RasterFormat, Result, Transport,
};
use polars::prelude::*;

const RUN: &str = "2024-01-01T00.00.00Z";
const NEXT_RUN: &str = "2024-01-01T03.00.00Z";
const TEMPERATURE: &str = "TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND";
const WIND_SPEED: &str = "WIND_SPEED__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND";
const GEOPOTENTIAL: &str = "GEOPOTENTIAL__ISOBARIC_SURFACE";

fn coverage_id(indicator: &str, run: &str) -> String {
    format!("{}___{}", indicator, run)
}

fn capabilities(ids: &[String]) -> String {
    let summaries: String = ids
        .iter()
        .map(|id| {
            format!(
                "<wcs:CoverageSummary><wcs:CoverageId>{}</wcs:CoverageId>\
                 <wcs:CoverageSubtype>ReferenceableGridCoverage</wcs:CoverageSubtype></wcs:CoverageSummary>",
                id
            )
        })
        .collect();
    format!("<wcs:Capabilities><wcs:Contents>{}</wcs:Contents></wcs:Capabilities>", summaries)
}

fn description(seconds: &str, heights: &str) -> String {
    describe(&[("time", seconds), ("height", heights)])
}

fn describe(axes: &[(&str, &str)]) -> String {
    let axes: String = axes
        .iter()
        .map(|(name, coefficients)| {
            format!(
                "<gmlrgrid:generalGridAxis><gmlrgrid:GeneralGridAxis>\
                 <gmlrgrid:coefficients>{}</gmlrgrid:coefficients><gmlrgrid:gridAxesSpanned>{}</gmlrgrid:gridAxesSpanned>\
                 </gmlrgrid:GeneralGridAxis></gmlrgrid:generalGridAxis>",
                coefficients, name
            )
        })
        .collect();
    format!(
        "<wcs:CoverageDescriptions><wcs:CoverageDescription><gml:domainSet><gmlrgrid:ReferenceableGridByVectors>\
         {}\
         </gmlrgrid:ReferenceableGridByVectors></gml:domainSet></wcs:CoverageDescription></wcs:CoverageDescriptions>",
        axes
    )
}

/// In-memory WCS service recording every request.
struct FakeService {
    capabilities: String,
    descriptions: HashMap<String, String>,
    calls: RefCell<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeService {
    fn new() -> Self {
        let mut descriptions = HashMap::new();
        for run in [RUN, NEXT_RUN] {
            descriptions.insert(coverage_id(TEMPERATURE, run), description("0 3600 7200", "2 10"));
        }
        descriptions.insert(coverage_id(WIND_SPEED, RUN), description("3600 7200", "10"));
        descriptions.insert(coverage_id(WIND_SPEED, NEXT_RUN), description("7200 10800", "10"));
        descriptions.insert(
            coverage_id(GEOPOTENTIAL, RUN),
            describe(&[("time", "0 3600"), ("pressure", "500 850"), ("height", "2 10")]),
        );
        descriptions.insert("A".to_string(), description("0 3600 7200 10800", ""));
        descriptions.insert("B".to_string(), description("3600 7200 14400", ""));

        let ids: Vec<String> = [RUN, NEXT_RUN]
            .iter()
            .flat_map(|run| [coverage_id(TEMPERATURE, run), coverage_id(WIND_SPEED, run)])
            .collect();

        Self {
            capabilities: capabilities(&ids),
            descriptions,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// `subset` values of every GetCoverage request, in order.
    fn coverage_subsets(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(path, _)| path.ends_with("/GetCoverage"))
            .map(|(_, params)| {
                params
                    .iter()
                    .filter(|(k, _)| k == "subset")
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .collect()
    }
}

impl Transport for FakeService {
    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        self.calls.borrow_mut().push((
            path.to_string(),
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ));
        let param = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());

        match path.rsplit('/').next().unwrap_or_default() {
            "GetCapabilities" => Ok(ApiResponse::new(path, self.capabilities.clone())),
            "DescribeCoverage" => {
                let id = param("coverageid").unwrap_or_default();
                match self.descriptions.get(&id) {
                    Some(xml) => Ok(ApiResponse::new(path, xml.clone())),
                    None => Err(Error::NotFound {
                        url: path.to_string(),
                        message: id,
                    }),
                }
            }
            "GetCoverage" => {
                let body: Vec<String> = params
                    .iter()
                    .filter(|(k, _)| *k == "coverageid" || *k == "subset")
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                Ok(ApiResponse::new(path, body.join("\n")))
            }
            _ => Err(Error::NotFound {
                url: path.to_string(),
                message: "unknown operation".into(),
            }),
        }
    }
}

fn clause(subset: &str, axis: &str) -> Option<i64> {
    subset
        .strip_prefix(axis)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| s.parse().ok())
}

/// Decodes the payloads of [`FakeService`] into two grid cells.
struct FakeDecoder;

impl RasterDecoder for FakeDecoder {
    fn decode(&self, path: &Path) -> Result<DataFrame> {
        let body = std::fs::read_to_string(path)?;
        let mut id = None;
        let mut seconds = 0;
        let mut height = None;
        let mut pressure = None;
        for line in body.lines() {
            match line.split_once('=') {
                Some(("coverageid", v)) => id = Some(CoverageId::parse(v)?),
                Some(("subset", v)) => {
                    if let Some(s) = clause(v, "time") {
                        seconds = s;
                    }
                    if let Some(h) = clause(v, "height") {
                        height = Some(h);
                    }
                    if let Some(p) = clause(v, "pressure") {
                        pressure = Some(p);
                    }
                }
                _ => {}
            }
        }
        let id = id.ok_or_else(|| Error::Decode("no coverage id".into()))?;
        let value = if id.indicator == TEMPERATURE { 12.3 } else { 5.0 };
        let step = seconds / 3600;

        let mut columns = vec![
            Column::new("latitude".into(), [45.0, 46.0]),
            Column::new("longitude".into(), [2.0, 2.0]),
            Column::new("time".into(), [id.run.as_str(), id.run.as_str()]),
            Column::new("step".into(), [step, step]),
            Column::new("valid_time".into(), [seconds, seconds]),
        ];
        if let Some(h) = height {
            columns.push(Column::new("heightAboveGround".into(), [h, h]));
        }
        if let Some(p) = pressure {
            columns.push(Column::new("isobaricInhPa".into(), [p, p]));
        }
        columns.push(Column::new("unknown".into(), [value, value + 1.0]));
        Ok(DataFrame::new(columns)?)
    }
}

fn forecast<'a>(service: &'a FakeService, cache: &Path) -> Forecast<&'a FakeService, FakeDecoder> {
    Forecast::new(service, FakeDecoder, Domain::default_for(Model::Arome))
        .unwrap()
        .with_cache_dir(cache)
}

fn names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

#[test]
fn catalog_is_fetched_once() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    assert_eq!(forecast.catalog().len(), 4);
    assert_eq!(forecast.catalog().latest_run(TEMPERATURE), Some(NEXT_RUN));
    assert_eq!(forecast.get_capabilities().unwrap().height(), 4);
    forecast
        .resolve_coverage_id(TEMPERATURE, None, None)
        .unwrap();

    let calls = service.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        "arome/1.0/wcs/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS/GetCapabilities"
    );
}

#[test]
fn single_indicator_end_to_end() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CoverageQuery::indicator(TEMPERATURE).with_run(RUN);
    let df = forecast.get_coverage(&query).unwrap();

    assert_eq!(names(&df), vec!["latitude", "longitude", "run", "forecast_horizon", "t_2m"]);
    assert_eq!(df.height(), 2);
    assert_eq!(df.column("t_2m").unwrap().get(0).unwrap(), AnyValue::Float64(12.3));
    assert_eq!(df.column("run").unwrap().get(0).unwrap(), AnyValue::String(RUN));
    assert_eq!(df.column("forecast_horizon").unwrap().get(0).unwrap(), AnyValue::Int64(0));

    assert_eq!(
        service.coverage_subsets(),
        vec![vec![
            "height(2)".to_string(),
            "time(0)".to_string(),
            "lat(41.33356,51.0889)".to_string(),
            "long(-5.1413,9.5602)".to_string(),
        ]]
    );

    let raster = CoverageRequest {
        coverage_id: coverage_id(TEMPERATURE, RUN),
        height: Some(2),
        pressure: None,
        forecast_horizon: 0,
        lat: query.lat,
        long: query.long,
        format: RasterFormat::Grib,
    }
    .cache_path(cache.path());
    assert!(!raster.exists(), "decoded raster must be removed");
}

#[test]
fn cartesian_order_is_horizon_then_height() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CoverageQuery::coverage_id(coverage_id(TEMPERATURE, RUN))
        .with_heights(vec![2, 10])
        .with_forecast_horizons(vec![0, 1]);
    let df = forecast.get_coverage(&query).unwrap();
    assert_eq!(df.height(), 8);

    let order: Vec<(String, String)> = service
        .coverage_subsets()
        .into_iter()
        .map(|s| (s[1].clone(), s[0].clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("time(0)".to_string(), "height(2)".to_string()),
            ("time(0)".to_string(), "height(10)".to_string()),
            ("time(3600)".to_string(), "height(2)".to_string()),
            ("time(3600)".to_string(), "height(10)".to_string()),
        ]
    );
    assert_eq!(df.column("t_10m").unwrap().null_count(), 4);
}

#[test]
fn cartesian_order_is_horizon_then_pressure_then_height() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CoverageQuery::coverage_id(coverage_id(GEOPOTENTIAL, RUN))
        .with_pressures(vec![500, 850])
        .with_heights(vec![2, 10])
        .with_forecast_horizons(vec![0, 1]);
    let df = forecast.get_coverage(&query).unwrap();
    assert_eq!(df.height(), 16);

    let mut expected = Vec::new();
    for seconds in [0, 3600] {
        for pressure in [500, 850] {
            for height in [2, 10] {
                expected.push(vec![
                    format!("pressure({})", pressure),
                    format!("height({})", height),
                    format!("time({})", seconds),
                ]);
            }
        }
    }
    let order: Vec<Vec<String>> = service
        .coverage_subsets()
        .into_iter()
        .map(|s| s[..3].to_vec())
        .collect();
    assert_eq!(order, expected);
    assert_eq!(df.column("g_10m").unwrap().null_count(), 8);
    assert!(!names(&df).contains(&"isobaricInhPa".to_string()));
}

#[test]
fn target_must_be_unambiguous() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let both = CoverageQuery {
        coverage_id: Some(coverage_id(TEMPERATURE, RUN)),
        ..CoverageQuery::indicator(TEMPERATURE)
    };
    assert!(matches!(forecast.get_coverage(&both), Err(Error::AmbiguousTarget { .. })));
    assert!(matches!(
        forecast.get_coverage(&CoverageQuery::default()),
        Err(Error::AmbiguousTarget { .. })
    ));
    assert!(service.coverage_subsets().is_empty());
}

#[test]
fn empty_indicator_counts_as_absent() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CoverageQuery {
        indicator: Some(String::new()),
        ..CoverageQuery::coverage_id(coverage_id(TEMPERATURE, RUN))
    };
    let df = forecast.get_coverage(&query).unwrap();
    assert_eq!(names(&df), vec!["latitude", "longitude", "run", "forecast_horizon", "t_2m"]);
}

#[test]
fn unavailable_height_is_rejected() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CoverageQuery::indicator(TEMPERATURE).with_heights(vec![5]);
    let err = forecast.get_coverage(&query).unwrap_err();
    assert!(matches!(err, Error::InvalidAxisValue { param: "heights", .. }));
    assert!(err.is_validation());
}

#[test]
fn cached_raster_is_reused() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let request = CoverageRequest {
        coverage_id: coverage_id(TEMPERATURE, RUN),
        height: None,
        pressure: None,
        forecast_horizon: 1,
        lat: (37.5, 55.4),
        long: (-12.0, 16.0),
        format: RasterFormat::Grib,
    };
    let first = forecast.fetch_coverage_file(&request).unwrap();
    assert!(!first.was_cache_hit);
    assert!(first.path.ends_with("_m_3600Z_37.5-55.4_-12-16.grib"));

    let second = forecast.fetch_coverage_file(&request).unwrap();
    assert!(second.was_cache_hit);
    assert_eq!(first.path, second.path);
    assert_eq!(service.coverage_subsets().len(), 1);
}

#[test]
fn common_and_invalid_horizons() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());
    let ids = vec!["A".to_string(), "B".to_string()];

    assert_eq!(
        forecast.get_forecast_horizons(&ids).unwrap(),
        vec![vec![0, 1, 2, 3], vec![1, 2, 4]]
    );
    assert_eq!(forecast.find_common_forecast_horizons(&ids).unwrap(), vec![1, 2]);
    assert_eq!(forecast.validate_forecast_horizons(&ids, &[1, 2, 5]).unwrap(), ids);
    assert!(forecast.validate_forecast_horizons(&ids, &[1, 2]).unwrap().is_empty());
}

#[test]
fn combined_coverage_joins_indicators() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CombinedQuery::new([TEMPERATURE, WIND_SPEED], [RUN]).with_heights([2, 10]);
    let df = forecast.get_combined_coverage(&query).unwrap();

    assert_eq!(
        names(&df),
        vec!["latitude", "longitude", "run", "forecast_horizon", "t_2m", "ws_10m"]
    );
    assert_eq!(df.height(), 2);
    // smallest horizon shared by both coverages
    assert_eq!(df.column("forecast_horizon").unwrap().get(0).unwrap(), AnyValue::Int64(1));
    assert_eq!(df.column("ws_10m").unwrap().get(1).unwrap(), AnyValue::Float64(6.0));
}

#[test]
fn combined_coverage_concatenates_runs_in_order() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query = CombinedQuery::new([TEMPERATURE, WIND_SPEED], [NEXT_RUN, RUN])
        .with_heights([2, 10])
        .with_forecast_horizons(vec![2]);
    let df = forecast.get_combined_coverage(&query).unwrap();

    assert_eq!(df.height(), 4);
    assert_eq!(df.column("run").unwrap().get(0).unwrap(), AnyValue::String(NEXT_RUN));
    assert_eq!(df.column("run").unwrap().get(2).unwrap(), AnyValue::String(RUN));
}

#[test]
fn first_run_common_horizon_applies_to_every_run() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    // NEXT_RUN shares only 2h, RUN alone would default to 1h
    let query =
        CombinedQuery::new([TEMPERATURE, WIND_SPEED], [NEXT_RUN, RUN]).with_heights([2, 10]);
    let df = forecast.get_combined_coverage(&query).unwrap();

    assert_eq!(df.height(), 4);
    let horizons: Vec<Option<i64>> = df
        .column("forecast_horizon")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(horizons, vec![Some(2); 4]);
    assert!(
        service
            .coverage_subsets()
            .iter()
            .all(|s| s.contains(&"time(7200)".to_string()))
    );
}

#[test]
fn first_run_common_horizon_must_exist_in_later_runs() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let query =
        CombinedQuery::new([TEMPERATURE, WIND_SPEED], [RUN, NEXT_RUN]).with_heights([2, 10]);
    match forecast.get_combined_coverage(&query) {
        Err(Error::InvalidForecastHorizons {
            horizons,
            coverage_ids,
        }) => {
            assert_eq!(horizons, vec![1]);
            assert_eq!(coverage_ids, vec![coverage_id(WIND_SPEED, NEXT_RUN)]);
        }
        other => panic!("unexpected result: {:?}", other.map(|df| df.height())),
    }
    assert!(service.coverage_subsets().is_empty());
}

#[test]
fn combined_coverage_validates_before_fetching() {
    let service = FakeService::new();
    let cache = tempfile::tempdir().unwrap();
    let forecast = forecast(&service, cache.path());

    let duplicate = CombinedQuery::new([TEMPERATURE], [RUN, RUN]);
    assert!(matches!(
        forecast.get_combined_coverage(&duplicate),
        Err(Error::DuplicateRun(_))
    ));

    let lengths = CombinedQuery::new([TEMPERATURE, WIND_SPEED], [RUN]).with_heights([2]);
    assert!(matches!(
        forecast.get_combined_coverage(&lengths),
        Err(Error::LengthMismatch { param: "heights", .. })
    ));

    let horizons = CombinedQuery::new([TEMPERATURE, WIND_SPEED], [RUN])
        .with_heights([2, 10])
        .with_forecast_horizons(vec![0]);
    match forecast.get_combined_coverage(&horizons) {
        Err(Error::InvalidForecastHorizons { coverage_ids, .. }) => {
            assert_eq!(coverage_ids, vec![coverage_id(WIND_SPEED, RUN)]);
        }
        other => panic!("unexpected result: {:?}", other.map(|df| df.height())),
    }

    assert!(service.coverage_subsets().is_empty());
}

#[test]
fn prebuilt_catalog_skips_capabilities() {
    let service = FakeService::new();
    let catalog = Catalog::from_capabilities_xml(&service.capabilities).unwrap();
    let forecast =
        Forecast::with_catalog(&service, FakeDecoder, Domain::default_for(Model::Arome), catalog);

    let axis = forecast
        .get_coverage_description(&coverage_id(WIND_SPEED, RUN))
        .unwrap();
    assert_eq!(axis.forecast_horizons, vec![1, 2]);
    assert_eq!(axis.heights, vec![10]);
    assert_eq!(service.calls.borrow().len(), 1);
}
