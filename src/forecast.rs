use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;

use crate::axis::AxisDescription;
use crate::catalog::Catalog;
use crate::client::Transport;
use crate::decode::RasterDecoder;
use crate::error::Result;
use crate::fetch::{self, CoverageRequest, RasterFile, RasterFormat};
use crate::model::Domain;
use crate::resolve;

/// Entry point to one WCS service (model × territory × precision).
///
/// The catalog is fetched once when the value is built; build a new
/// `Forecast` to see runs published since.
#[derive(Debug)]
pub struct Forecast<T, D> {
    pub(crate) transport: T,
    pub(crate) decoder: D,
    pub(crate) domain: Domain,
    pub(crate) catalog: Catalog,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) format: RasterFormat,
    pub(crate) progress: bool,
}

impl<T: Transport, D: RasterDecoder> Forecast<T, D> {
    /// Fetches the capabilities of `domain` and builds the catalog.
    pub fn new(transport: T, decoder: D, domain: Domain) -> Result<Self> {
        let catalog = Catalog::fetch(&transport, &domain)?;
        Ok(Self::with_catalog(transport, decoder, domain, catalog))
    }

    /// Uses an already built catalog, no request is made.
    pub fn with_catalog(transport: T, decoder: D, domain: Domain, catalog: Catalog) -> Self {
        Self {
            transport,
            decoder,
            domain,
            catalog,
            cache_dir: None,
            format: RasterFormat::Grib,
            progress: false,
        }
    }

    /// Directory rasters are downloaded under (default: current directory).
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Shows a progress bar over the raster fetches of a query.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_format(mut self, format: RasterFormat) -> Self {
        self.format = format;
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The catalog as a table.
    pub fn get_capabilities(&self) -> Result<DataFrame> {
        self.catalog.to_frame()
    }

    pub fn get_coverage_description(&self, coverage_id: &str) -> Result<AxisDescription> {
        AxisDescription::fetch(&self.transport, &self.domain, coverage_id)
    }

    pub fn resolve_coverage_id(
        &self,
        indicator: &str,
        run: Option<&str>,
        interval: Option<&str>,
    ) -> Result<String> {
        resolve::resolve_coverage_id(&self.catalog, self.domain.model(), indicator, run, interval)
    }

    /// Downloads one raster and leaves it on disk.
    pub fn fetch_coverage_file(&self, request: &CoverageRequest) -> Result<RasterFile> {
        let dir = self.cache_dir()?;
        fetch::fetch_coverage_file(&self.transport, &self.domain, request, &dir)
    }

    pub(crate) fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    pub(crate) fn fetch_single(&self, request: &CoverageRequest, dir: &Path) -> Result<DataFrame> {
        fetch::fetch_coverage(&self.transport, &self.decoder, &self.domain, request, dir)
    }
}
