//! Static description of the forecast models served over WCS.

use std::fmt;

use crate::error::{Error, Result};

pub(crate) const API_VERSION: &str = "1.0";
const PUBLIC_API_URL: &str = "https://public-api.meteofrance.fr/public/";
const PRO_API_URL: &str = "https://api.meteofrance.fr/pro/";

/// Metropolitan France, `(min, max)` latitudes.
pub const FRANCE_METRO_LATITUDES: (f64, f64) = (41.33356, 51.0889);
/// Metropolitan France, `(min, max)` longitudes.
pub const FRANCE_METRO_LONGITUDES: (f64, f64) = (-5.1413, 9.5602);

const OVERSEAS_AND_FRANCE: &[&str] = &["FRANCE", "NCALED", "INDIEN", "POLYN", "GUYANE", "ANTIL"];
const ARPEGE_TERRITORIES: &[&str] = &["EUROPE", "GLOBE", "ATOURX", "EURAT"];

const AROME_INSTANT_INDICATORS: &[&str] = &[
    "GEOMETRIC_HEIGHT__GROUND_OR_WATER_SURFACE",
    "BRIGHTNESS_TEMPERATURE__GROUND_OR_WATER_SURFACE",
    "CONVECTIVE_AVAILABLE_POTENTIAL_ENERGY__GROUND_OR_WATER_SURFACE",
    "WIND_SPEED_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "WIND_SPEED__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "RELATIVE_HUMIDITY__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "LOW_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "HIGH_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "MEDIUM_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "PRESSURE__GROUND_OR_WATER_SURFACE",
    "TOTAL_PRECIPITATION_RATE__GROUND_OR_WATER_SURFACE",
    "TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "U_COMPONENT_OF_WIND_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "U_COMPONENT_OF_WIND__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "V_COMPONENT_OF_WIND_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "V_COMPONENT_OF_WIND__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
];

const AROME_AGGREGATED_INDICATORS: &[&str] = &[
    "TOTAL_WATER_PRECIPITATION__GROUND_OR_WATER_SURFACE",
    "TOTAL_SNOW_PRECIPITATION__GROUND_OR_WATER_SURFACE",
    "TOTAL_PRECIPITATION__GROUND_OR_WATER_SURFACE",
];

const ARPEGE_INSTANT_INDICATORS: &[&str] = &[
    "GEOMETRIC_HEIGHT__GROUND_OR_WATER_SURFACE",
    "BRIGHTNESS_TEMPERATURE__GROUND_OR_WATER_SURFACE",
    "CONVECTIVE_AVAILABLE_POTENTIAL_ENERGY__GROUND_OR_WATER_SURFACE",
    "SPECIFIC_CLOUD_ICE_WATER_CONTENT__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "SPECIFIC_CLOUD_ICE_WATER_CONTENT__ISOBARIC_SURFACE",
    "WIND_SPEED_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "WIND_SPEED__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "WIND_SPEED__ISOBARIC_SURFACE",
    "DOWNWARD_SHORT_WAVE_RADIATION_FLUX__GROUND_OR_WATER_SURFACE",
    "SHORT_WAVE_RADIATION_FLUX__GROUND_OR_WATER_SURFACE",
    "RELATIVE_HUMIDITY__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "RELATIVE_HUMIDITY__ISOBARIC_SURFACE",
    "PLANETARY_BOUNDARY_LAYER_HEIGHT__GROUND_OR_WATER_SURFACE",
    "LOW_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "HIGH_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "MEDIUM_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "PRESSURE__GROUND_OR_WATER_SURFACE",
    "PRESSURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "PRESSURE__MEAN_SEA_LEVEL",
    "ABSOLUTE_VORTICITY__ISOBARIC_SURFACE",
    "DEW_POINT_TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "DEW_POINT_TEMPERATURE__ISOBARIC_SURFACE",
    "TURBULENT_KINETIC_ENERGY__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "TURBULENT_KINETIC_ENERGY__ISOBARIC_SURFACE",
    "MAXIMUM_TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "MINIMUM_TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "PSEUDO_ADIABATIC_POTENTIAL_TEMPERATURE__ISOBARIC_SURFACE",
    "POTENTIAL_VORTICITY__ISOBARIC_SURFACE",
    "TEMPERATURE__GROUND_OR_WATER_SURFACE",
    "TEMPERATURE__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "TEMPERATURE__ISOBARIC_SURFACE",
    "U_COMPONENT_OF_WIND_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "U_COMPONENT_OF_WIND__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "U_COMPONENT_OF_WIND__ISOBARIC_SURFACE",
    "U_COMPONENT_OF_WIND__POTENTIAL_VORTICITY_SURFACE_1500",
    "U_COMPONENT_OF_WIND__POTENTIAL_VORTICITY_SURFACE_2000",
    "VERTICAL_VELOCITY_PRESSURE__ISOBARIC_SURFACE",
    "V_COMPONENT_OF_WIND_GUST__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "V_COMPONENT_OF_WIND__SPECIFIC_HEIGHT_LEVEL_ABOVE_GROUND",
    "V_COMPONENT_OF_WIND__ISOBARIC_SURFACE",
    "V_COMPONENT_OF_WIND__POTENTIAL_VORTICITY_SURFACE_1500",
    "V_COMPONENT_OF_WIND__POTENTIAL_VORTICITY_SURFACE_2000",
    "GEOPOTENTIAL__ISOBARIC_SURFACE",
];

const ARPEGE_AGGREGATED_INDICATORS: &[&str] = &[
    "TOTAL_WATER_PRECIPITATION__GROUND_OR_WATER_SURFACE",
    "TOTAL_CLOUD_COVER__GROUND_OR_WATER_SURFACE",
    "TOTAL_SNOW_PRECIPITATION__GROUND_OR_WATER_SURFACE",
    "TOTAL_PRECIPITATION__GROUND_OR_WATER_SURFACE",
];

const PIAF_AGGREGATED_INDICATORS: &[&str] = &["TOTAL_PRECIPITATION_RATE__GROUND_OR_WATER_SURFACE"];

/// A numerical weather prediction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// High resolution, France and overseas territories.
    Arome,
    /// Global model.
    Arpege,
    /// Precipitation nowcasting.
    Piaf,
}

impl Model {
    /// Lower-case name, also the first segment of every WCS path.
    pub fn name(&self) -> &'static str {
        match self {
            Model::Arome => "arome",
            Model::Arpege => "arpege",
            Model::Piaf => "piaf",
        }
    }

    pub(crate) fn base_entry_point(&self) -> &'static str {
        match self {
            Model::Arome => "wcs/MF-NWP-HIGHRES-AROME",
            Model::Arpege => "wcs/MF-NWP-GLOBAL-ARPEGE",
            Model::Piaf => "wcs/MF-NWP-HIGHRES-PIAF",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Model::Arome | Model::Arpege => PUBLIC_API_URL,
            Model::Piaf => PRO_API_URL,
        }
    }

    pub fn default_territory(&self) -> &'static str {
        match self {
            Model::Arome | Model::Piaf => "FRANCE",
            Model::Arpege => "EUROPE",
        }
    }

    pub fn territories(&self) -> &'static [&'static str] {
        match self {
            Model::Arome | Model::Piaf => OVERSEAS_AND_FRANCE,
            Model::Arpege => ARPEGE_TERRITORIES,
        }
    }

    /// Hours between two runs.
    pub fn run_frequency(&self) -> u32 {
        match self {
            Model::Arome => 3,
            Model::Arpege => 6,
            Model::Piaf => 1,
        }
    }

    /// Indicators valid at a single instant: their coverage ids carry no interval.
    pub fn instant_indicators(&self) -> &'static [&'static str] {
        match self {
            Model::Arome => AROME_INSTANT_INDICATORS,
            Model::Arpege => ARPEGE_INSTANT_INDICATORS,
            Model::Piaf => &[],
        }
    }

    /// Indicators aggregated over an interval (`P1D`, `PT3H`, ...).
    pub fn aggregated_indicators(&self) -> &'static [&'static str] {
        match self {
            Model::Arome => AROME_AGGREGATED_INDICATORS,
            Model::Arpege => ARPEGE_AGGREGATED_INDICATORS,
            Model::Piaf => PIAF_AGGREGATED_INDICATORS,
        }
    }

    pub fn indicators(&self) -> Vec<&'static str> {
        self.instant_indicators()
            .iter()
            .chain(self.aggregated_indicators())
            .copied()
            .collect()
    }

    pub fn is_known_indicator(&self, indicator: &str) -> bool {
        self.instant_indicators().contains(&indicator)
            || self.aggregated_indicators().contains(&indicator)
    }

    pub fn is_instant_indicator(&self, indicator: &str) -> bool {
        self.instant_indicators().contains(&indicator)
    }

    /// Grid resolution(s) in degrees the model accepts for `territory`.
    fn precisions(&self, territory: &str) -> &'static [f64] {
        match (self, territory) {
            (Model::Arome, _) => &[0.01, 0.025],
            (Model::Piaf, _) => &[0.01],
            (Model::Arpege, "EUROPE") | (Model::Arpege, "ATOURX") => &[0.1],
            (Model::Arpege, "GLOBE") => &[0.25],
            (Model::Arpege, "EURAT") => &[0.05],
            (Model::Arpege, _) => &[],
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

fn precision_code(precision: f64) -> Option<&'static str> {
    const CODES: &[(f64, &str)] = &[
        (0.25, "025"),
        (0.1, "01"),
        (0.05, "005"),
        (0.01, "001"),
        (0.025, "0025"),
    ];
    CODES
        .iter()
        .find(|(p, _)| (p - precision).abs() < 1e-9)
        .map(|(_, code)| *code)
}

/// A validated model/territory/precision triple, i.e. one WCS service.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    model: Model,
    territory: String,
    precision: f64,
}

impl Domain {
    pub fn new(model: Model, territory: &str, precision: f64) -> Result<Self> {
        if !model.territories().contains(&territory) {
            return Err(Error::InvalidParameter {
                param: "territory",
                message: format!(
                    "`{}` is not served by {}, expected one of {:?}",
                    territory,
                    model,
                    model.territories()
                ),
            });
        }

        let allowed = model.precisions(territory);
        if !allowed.iter().any(|p| (p - precision).abs() < 1e-9) {
            return Err(Error::InvalidParameter {
                param: "precision",
                message: format!(
                    "{} is not available for {} over {}, expected one of {:?}",
                    precision, model, territory, allowed
                ),
            });
        }

        Ok(Self {
            model,
            territory: territory.to_string(),
            precision,
        })
    }

    /// The model's default territory at its finest available precision.
    pub fn default_for(model: Model) -> Self {
        let territory = model.default_territory();
        Self {
            model,
            territory: territory.to_string(),
            precision: model.precisions(territory)[0],
        }
    }

    /// ARPEGE precision is implied by the territory.
    pub fn arpege(territory: &str) -> Result<Self> {
        let precision = Model::Arpege
            .precisions(territory)
            .first()
            .copied()
            .unwrap_or(f64::NAN);
        Self::new(Model::Arpege, territory, precision)
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn territory(&self) -> &str {
        &self.territory
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// e.g. `wcs/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS`.
    pub fn entry_point(&self) -> String {
        // Domain::new only accepts precisions that have a code.
        let code = precision_code(self.precision).unwrap_or("001");
        format!(
            "{}-{}-{}-WCS",
            self.model.base_entry_point(),
            code,
            self.territory
        )
    }

    /// e.g. `arome/1.0`.
    pub fn base_path(&self) -> String {
        format!("{}/{}", self.model.name(), API_VERSION)
    }

    pub(crate) fn operation_path(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.base_path(), self.entry_point(), operation)
    }
}
