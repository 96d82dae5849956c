//! Weather warnings ("vigilance") for metropolitan France.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Transport;
use crate::error::{Error, Result};

const BASE_PATH: &str = "DPVigilance/v1";
const DEFAULT_VIGNETTE: &str = "vignette.png";

/// Phenomenon labels by `phenomenon_id`.
pub fn phenomenon_label(id: &str) -> Option<&'static str> {
    match id {
        "1" => Some("vent"),
        "2" => Some("pluie"),
        "3" => Some("orages"),
        "4" => Some("crues"),
        "5" => Some("neige / verglas"),
        "6" => Some("canicule"),
        "7" => Some("grand froid"),
        "8" => Some("avalanches"),
        "9" => Some("vagues submersion"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CarteVigilance {
    product: Product,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
struct Period {
    echeance: String,
    #[serde(default)]
    per_phenomenon_items: Vec<PhenomenonItem>,
    #[serde(default)]
    timelaps: Option<Timelaps>,
    /// Same content as `timelaps.domain_ids`, flattened.
    #[serde(default, rename = "timelaps.domain_ids")]
    flat_domain_ids: Vec<DomainItem>,
}

#[derive(Debug, Deserialize)]
struct Timelaps {
    #[serde(default)]
    domain_ids: Vec<DomainItem>,
}

#[derive(Debug, Deserialize)]
struct PhenomenonItem {
    #[serde(deserialize_with = "string_or_number")]
    phenomenon_id: String,
    any_color_count: i64,
}

#[derive(Debug, Deserialize)]
struct DomainItem {
    #[serde(deserialize_with = "string_or_number")]
    domain_id: String,
    max_color_id: i64,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {}",
            other
        ))),
    }
}

/// National warning map image.
#[derive(Debug, Clone)]
pub struct Vignette {
    pub filename: String,
    pub png: Vec<u8>,
}

/// Client of the `DPVigilance` API.
#[derive(Debug)]
pub struct Vigilance<T> {
    transport: T,
}

impl<T: Transport> Vigilance<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Current warning bulletin. An empty object when none is published.
    pub fn textes_vigilance(&self) -> Result<Value> {
        let path = format!("{}/textesvigilance/encours", BASE_PATH);
        debug!(%path, "GET");
        match self.transport.get(&path, &[]) {
            Ok(resp) => resp.json(),
            Err(Error::NotFound { message, .. }) if message.contains("no matching blob") => {
                warn!("the current vigilance does not require a bulletin");
                Ok(Value::Object(Default::default()))
            }
            Err(e) => Err(e),
        }
    }

    /// Current warning map, with colors per phenomenon and per domain.
    pub fn carte_vigilance(&self) -> Result<Value> {
        let path = format!("{}/cartevigilance/encours", BASE_PATH);
        debug!(%path, "GET");
        self.transport.get(&path, &[])?.json()
    }

    /// National J / J+1 vignette: PNG bytes and the file name the service
    /// announces (`vignette.png` when it does not).
    pub fn vignette(&self) -> Result<Vignette> {
        let path = format!("{}/vignettenationale-J-et-J1/encours", BASE_PATH);
        debug!(%path, "GET");
        let resp = self.transport.get(&path, &[])?;
        let filename = resp.filename().unwrap_or(DEFAULT_VIGNETTE).to_string();
        Ok(Vignette {
            filename,
            png: resp.body,
        })
    }

    /// Downloads the vignette into `dir` under its announced file name.
    pub fn save_vignette(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let vignette = self.vignette()?;
        let path = dir.as_ref().join(&vignette.filename);
        fs::write(&path, &vignette.png)?;
        info!(path = %path.display(), bytes = vignette.png.len(), "saved vignette");
        Ok(path)
    }

    /// Flattens the warning map into `(phenomena, timelaps)` tables for the
    /// `J` and `J1` periods.
    pub fn phenomenon(&self) -> Result<(DataFrame, DataFrame)> {
        phenomenon_frames(self.carte_vigilance()?)
    }
}

pub(crate) fn phenomenon_frames(carte: Value) -> Result<(DataFrame, DataFrame)> {
    let carte: CarteVigilance = serde_json::from_value(carte)?;

    let mut ids = Vec::new();
    let mut counts = Vec::new();
    let mut phenomenon_echeances = Vec::new();
    let mut labels = Vec::new();

    let mut domain_ids = Vec::new();
    let mut max_colors = Vec::new();
    let mut domain_echeances = Vec::new();

    for echeance in ["J", "J1"] {
        for period in carte.product.periods.iter().filter(|p| p.echeance == echeance) {
            for item in &period.per_phenomenon_items {
                ids.push(item.phenomenon_id.clone());
                counts.push(item.any_color_count);
                phenomenon_echeances.push(echeance);
                labels.push(phenomenon_label(&item.phenomenon_id));
            }

            let nested = period.timelaps.iter().flat_map(|t| t.domain_ids.iter());
            for domain in nested.chain(period.flat_domain_ids.iter()) {
                domain_ids.push(domain.domain_id.clone());
                max_colors.push(domain.max_color_id);
                domain_echeances.push(echeance);
            }
        }
    }

    let phenomena = df!(
        "phenomenon_id" => ids,
        "any_color_count" => counts,
        "echeance" => phenomenon_echeances,
        "phenomenon_libelle" => labels,
    )?;
    let timelaps = df!(
        "domain_id" => domain_ids,
        "max_color_id" => max_colors,
        "echeance" => domain_echeances,
    )?;
    Ok((phenomena, timelaps))
}
