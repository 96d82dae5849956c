//! Admissible subset values of a coverage, read from `DescribeCoverage`.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::client::Transport;
use crate::error::{Error, Result};
use crate::model::Domain;

/// Values a coverage can be subset on. An empty axis does not apply to the
/// coverage (e.g. no height for surface indicators).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisDescription {
    /// Hours after the run.
    pub forecast_horizons: Vec<i64>,
    /// Meters above ground.
    pub heights: Vec<i64>,
    /// hPa.
    pub pressures: Vec<i64>,
}

/// One `gmlrgrid:GeneralGridAxis`: the dimension name and its raw coefficients.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GridAxis {
    pub(crate) name: String,
    pub(crate) coefficients: String,
}

impl AxisDescription {
    pub fn from_description_xml(xml: &str) -> Result<Self> {
        let axes = parse_grid_axes(xml)?;
        Ok(Self {
            forecast_horizons: available_values(&axes, "time")?
                .into_iter()
                .map(|seconds| seconds / 3600)
                .collect(),
            heights: available_values(&axes, "height")?,
            pressures: available_values(&axes, "pressure")?,
        })
    }

    pub fn fetch<T: Transport + ?Sized>(
        transport: &T,
        domain: &Domain,
        coverage_id: &str,
    ) -> Result<Self> {
        let params = [
            ("service", "WCS".to_string()),
            ("version", "2.0.1".to_string()),
            ("coverageid", coverage_id.to_string()),
        ];
        let response = transport.get(&domain.operation_path("DescribeCoverage"), &params)?;
        Self::from_description_xml(&response.text())
    }
}

/// Coefficients of the first axis spanning `name`, empty if there is none.
pub(crate) fn available_values(axes: &[GridAxis], name: &str) -> Result<Vec<i64>> {
    let Some(axis) = axes.iter().find(|a| a.name == name) else {
        return Ok(Vec::new());
    };
    axis.coefficients
        .split_whitespace()
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                Error::Xml(format!("non-integer coefficient `{}` on axis `{}`", raw, name))
            })
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum AxisField {
    Name,
    Coefficients,
}

pub(crate) fn parse_grid_axes(xml: &str) -> Result<Vec<GridAxis>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut axes = Vec::new();
    let mut current: Option<GridAxis> = None;
    let mut field: Option<AxisField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"GeneralGridAxis" => current = Some(GridAxis::default()),
                b"gridAxesSpanned" if current.is_some() => field = Some(AxisField::Name),
                b"coefficients" if current.is_some() => field = Some(AxisField::Coefficients),
                _ => field = None,
            },
            Ok(Event::Text(t)) => {
                if let (Some(axis), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape()?;
                    match f {
                        AxisField::Name => axis.name.push_str(text.trim()),
                        AxisField::Coefficients => axis.coefficients.push_str(&text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"GeneralGridAxis" {
                    if let Some(axis) = current.take() {
                        axes.push(axis);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "coverage description parsing failed at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(axes)
}
