//! The list of coverages a WCS service currently publishes.

use std::collections::BTreeSet;
use std::fmt;

use polars::prelude::*;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::info;

use crate::client::Transport;
use crate::error::{Error, Result};
use crate::model::Domain;

/// The decoded parts of a coverage identifier,
/// `<indicator>___<run>[_<interval>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverageId {
    pub indicator: String,
    pub run: String,
    pub interval: Option<String>,
}

impl CoverageId {
    pub fn new(indicator: &str, run: &str, interval: Option<&str>) -> Self {
        Self {
            indicator: indicator.to_string(),
            run: run.to_string(),
            interval: interval.map(str::to_string),
        }
    }

    pub fn parse(id: &str) -> Result<Self> {
        let (indicator, rest) = id
            .split_once("___")
            .ok_or_else(|| Error::InvalidCoverageId(id.to_string()))?;
        let (run, after_run) = rest
            .split_once('Z')
            .ok_or_else(|| Error::InvalidCoverageId(id.to_string()))?;
        let interval = after_run.split('Z').next().unwrap_or("").trim_matches('_');

        Ok(Self {
            indicator: indicator.to_string(),
            run: format!("{}Z", run),
            interval: (!interval.is_empty()).then(|| interval.to_string()),
        })
    }
}

impl fmt::Display for CoverageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}___{}", self.indicator, self.run)?;
        if let Some(interval) = &self.interval {
            write!(f, "_{}", interval)?;
        }
        Ok(())
    }
}

/// One `wcs:CoverageSummary` of the capabilities document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageSummary {
    pub id: String,
    pub title: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub title: Option<String>,
    pub subtype: Option<String>,
    pub indicator: String,
    pub run: String,
    pub interval: Option<String>,
}

/// Immutable snapshot of the published coverages.
///
/// Built once per [`crate::Forecast`]; construct a new one to refresh.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_summaries(summaries: Vec<CoverageSummary>) -> Result<Self> {
        let entries = summaries
            .into_iter()
            .map(|s| {
                let parts = CoverageId::parse(&s.id)?;
                Ok(CatalogEntry {
                    id: s.id,
                    title: s.title,
                    subtype: s.subtype,
                    indicator: parts.indicator,
                    run: parts.run,
                    interval: parts.interval,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn from_capabilities_xml(xml: &str) -> Result<Self> {
        Self::from_summaries(parse_capabilities(xml)?)
    }

    /// Downloads and decodes `GetCapabilities` for `domain`.
    pub fn fetch<T: Transport + ?Sized>(transport: &T, domain: &Domain) -> Result<Self> {
        info!(
            model = %domain.model(),
            territory = domain.territory(),
            "fetching all available coverages"
        );

        let params = [
            ("service", "WCS".to_string()),
            ("version", "2.0.1".to_string()),
            ("language", "eng".to_string()),
        ];
        let response = transport.get(&domain.operation_path("GetCapabilities"), &params)?;
        let catalog = Self::from_capabilities_xml(&response.text())?;

        let all_runs: BTreeSet<&str> = catalog.entries.iter().map(|e| e.run.as_str()).collect();
        let indicators: BTreeSet<&str> = catalog
            .entries
            .iter()
            .map(|e| e.indicator.as_str())
            .collect();
        info!(
            coverages = catalog.len(),
            indicators = indicators.len(),
            runs = all_runs.len(),
            oldest_run = all_runs.first().copied().unwrap_or("-"),
            latest_run = all_runs.last().copied().unwrap_or("-"),
            "successfully fetched coverages"
        );

        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn for_indicator<'a, 'b>(
        &'a self,
        indicator: &'b str,
    ) -> impl Iterator<Item = &'a CatalogEntry> + use<'a, 'b> {
        self.entries.iter().filter(move |e| e.indicator == indicator)
    }

    /// Distinct runs published for `indicator`, oldest first.
    pub fn runs(&self, indicator: &str) -> Vec<String> {
        self.for_indicator(indicator)
            .map(|e| e.run.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Runs are ISO-8601 like, so the lexicographic maximum is the latest.
    pub fn latest_run(&self, indicator: &str) -> Option<&str> {
        self.for_indicator(indicator).map(|e| e.run.as_str()).max()
    }

    /// Distinct aggregation intervals published for `indicator`.
    pub fn intervals(&self, indicator: &str) -> Vec<String> {
        self.for_indicator(indicator)
            .filter_map(|e| e.interval.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The catalog as a table: `id, title, subtype, indicator, run, interval`.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let ids: Vec<&str> = self.entries.iter().map(|e| e.id.as_str()).collect();
        let titles: Vec<Option<&str>> = self.entries.iter().map(|e| e.title.as_deref()).collect();
        let subtypes: Vec<Option<&str>> =
            self.entries.iter().map(|e| e.subtype.as_deref()).collect();
        let indicators: Vec<&str> = self.entries.iter().map(|e| e.indicator.as_str()).collect();
        let runs: Vec<&str> = self.entries.iter().map(|e| e.run.as_str()).collect();
        let intervals: Vec<Option<&str>> =
            self.entries.iter().map(|e| e.interval.as_deref()).collect();

        Ok(df!(
            "id" => ids,
            "title" => titles,
            "subtype" => subtypes,
            "indicator" => indicators,
            "run" => runs,
            "interval" => intervals,
        )?)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum SummaryField {
    Id,
    Title,
    Subtype,
}

/// Extracts the coverage summaries of a WCS 2.0 capabilities document.
pub(crate) fn parse_capabilities(xml: &str) -> Result<Vec<CoverageSummary>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut summaries = Vec::new();
    let mut current: Option<CoverageSummary> = None;
    let mut field: Option<SummaryField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"CoverageSummary" => current = Some(CoverageSummary::default()),
                b"CoverageId" if current.is_some() => field = Some(SummaryField::Id),
                b"Title" | b"CoverageTitle" if current.is_some() => {
                    field = Some(SummaryField::Title)
                }
                b"CoverageSubtype" if current.is_some() => field = Some(SummaryField::Subtype),
                _ => field = None,
            },
            Ok(Event::Text(t)) => {
                if let (Some(summary), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape()?.into_owned();
                    match f {
                        SummaryField::Id => summary.id.push_str(&text),
                        SummaryField::Title => summary.title = Some(text),
                        SummaryField::Subtype => summary.subtype = Some(text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"CoverageSummary" {
                    if let Some(summary) = current.take() {
                        if !summary.id.is_empty() {
                            summaries.push(summary);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "capabilities parsing failed at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(summaries)
}
