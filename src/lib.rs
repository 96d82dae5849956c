//! A Rust client for the Météo-France AROME / ARPEGE / PIAF forecast
//! coverages (OGC WCS 2.0.1), returning tidy Polars tables.
//!
//! The flow mirrors the service: list the published coverages
//! (GetCapabilities), read a coverage's axes (DescribeCoverage), then
//! download raster slices (GetCoverage) and decode them into one row per
//! grid cell keyed by `latitude`, `longitude`, `run` and `forecast_horizon`.
//!
//! ## Quick start
//! - Configure authentication via environment variables (`MF_API_KEY`,
//!   `MF_TOKEN` or `MF_APPLICATION_ID`) or a `.meteofrancerc` file.
//! - Build a [`Forecast`] for a [`Domain`] and query it.
//!
//! ```no_run
//! use anyhow::Result;
//! use meteofrance_wcs::{Client, CoverageQuery, Domain, Forecast, GribDecoder, Model};
//!
//! fn main() -> Result<()> {
//!     let domain = Domain::default_for(Model::Arome);
//!     let client = Client::for_model(Model::Arome, Default::default())?;
//!     let forecast = Forecast::new(client, GribDecoder, domain)?;
//!
//!     let query = CoverageQuery::indicator("TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND")
//!         .with_heights([2])
//!         .with_forecast_horizons([1, 2, 3]);
//!     let df = forecast.get_coverage(&query)?;
//!     println!("{}", df);
//!     Ok(())
//! }
//! ```
//!
//! For full usage and configuration details, see the crate README.

#![forbid(unsafe_code)]

mod assemble;
mod axis;
mod catalog;
mod client;
mod combine;
mod config;
mod decode;
mod error;
mod fetch;
mod forecast;
mod model;
mod resolve;
mod util;
mod vigilance;

pub use assemble::CoverageQuery;
pub use axis::AxisDescription;
pub use catalog::{Catalog, CatalogEntry, CoverageId, CoverageSummary};
pub use client::{ApiResponse, Client, ClientConfig, Transport};
pub use combine::{CombinedQuery, JOIN_KEYS, join_one_to_one};
pub use decode::{GribDecoder, RasterDecoder};
pub use error::{Error, Result};
pub use fetch::{CoverageRequest, RasterFile, RasterFormat, normalize_frame};
pub use forecast::Forecast;
pub use model::{Domain, FRANCE_METRO_LATITUDES, FRANCE_METRO_LONGITUDES, Model};
pub use resolve::{DEFAULT_INTERVAL, RUN_FORMAT, resolve_coverage_id};
pub use vigilance::{Vigilance, Vignette, phenomenon_label};
