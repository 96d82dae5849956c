use polars::prelude::PolarsError;
use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === Validation ===
    #[error("unknown indicator `{indicator}` for model {model}; see `Model::indicators()` for the full list")]
    UnknownIndicator { indicator: String, model: String },

    #[error("run '{0}' is invalid, expected format 'YYYY-MM-DDTHH.MM.SSZ'")]
    InvalidRunFormat(String),

    #[error("run '{run}' is invalid for `{indicator}`, valid runs: {valid:?}")]
    InvalidRun {
        indicator: String,
        run: String,
        valid: Vec<String>,
    },

    #[error("interval={interval} is invalid, no interval is expected for instant indicator `{indicator}`")]
    UnexpectedInterval { indicator: String, interval: String },

    #[error("interval={interval} is invalid for `{indicator}`, valid intervals: {valid:?}")]
    InvalidInterval {
        indicator: String,
        interval: String,
        valid: Vec<String>,
    },

    #[error("exactly one of `indicator` or `coverage_id` must be set (indicator={indicator:?}, coverage_id={coverage_id:?})")]
    AmbiguousTarget {
        indicator: Option<String>,
        coverage_id: Option<String>,
    },

    #[error("`{param}={requested:?}` is invalid, available {param}: {available:?}")]
    InvalidAxisValue {
        param: &'static str,
        requested: Vec<i64>,
        available: Vec<i64>,
    },

    #[error("the runs must be distinct, `{0}` is repeated")]
    DuplicateRun(String),

    #[error(
        "the length of {param} ({actual}) must match the length of indicator_names ({expected}); \
         repeat an indicator name to request several levels for it"
    )]
    LengthMismatch {
        param: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("forecast horizons {horizons:?} are not valid for coverage ids {coverage_ids:?}")]
    InvalidForecastHorizons {
        horizons: Vec<i64>,
        coverage_ids: Vec<String>,
    },

    #[error("no forecast horizon is shared by coverage ids {0:?}")]
    NoCommonForecastHorizon(Vec<String>),

    #[error("invalid parameter `{param}`: {message}")]
    InvalidParameter { param: &'static str, message: String },

    // === Data ===
    #[error("cannot identify the measurement column of `{coverage_id}`, candidates: {candidates:?}")]
    AmbiguousMeasurement {
        coverage_id: String,
        candidates: Vec<String>,
    },

    #[error("one-to-one join violated: {0}")]
    Consistency(String),

    #[error("invalid coverage id `{0}`")]
    InvalidCoverageId(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("raster decoding failed: {0}")]
    Decode(String),

    // === Service ===
    #[error("resource not found (HTTP 404) for url ({url})\n{message}")]
    NotFound { url: String, message: String },

    #[error("API request failed: HTTP {status} for url ({url})\n{message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    #[error("service unavailable for url ({url}) after {attempts} attempt(s)")]
    ServiceUnavailable { url: String, attempts: usize },

    #[error("configuration error: {0}")]
    Config(String),

    // === Plumbing ===
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table error: {0}")]
    Polars(#[from] PolarsError),
}

impl Error {
    /// True for argument errors raised before any data is fetched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownIndicator { .. }
                | Error::InvalidRunFormat(_)
                | Error::InvalidRun { .. }
                | Error::UnexpectedInterval { .. }
                | Error::InvalidInterval { .. }
                | Error::AmbiguousTarget { .. }
                | Error::InvalidAxisValue { .. }
                | Error::DuplicateRun(_)
                | Error::LengthMismatch { .. }
                | Error::InvalidForecastHorizons { .. }
                | Error::NoCommonForecastHorizon(_)
                | Error::InvalidParameter { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<grib::GribError> for Error {
    fn from(err: grib::GribError) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Error payload returned by the API gateway.
///
/// Depending on the endpoint the body is either a gateway fault
/// (`{"code": "900901", "message": ..., "description": ...}`) or a plain
/// `{"detail": ...}`.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
}

impl ApiErrorResponse {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

pub(crate) fn format_api_error(status: StatusCode, url: &str, text: &str) -> Error {
    let message = match ApiErrorResponse::parse(text) {
        Some(body) => {
            let title = body.message.as_deref().unwrap_or("");
            let detail = body
                .description
                .as_deref()
                .or(body.detail.as_deref())
                .unwrap_or("");
            let code = body.code.as_deref().unwrap_or("(none)");
            format!("{}\n{}\ncode: {}", title, detail, code)
        }
        None => text.to_string(),
    };

    if status == StatusCode::NOT_FOUND {
        return Error::NotFound {
            url: url.to_string(),
            message,
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Api {
            status: status.as_u16(),
            url: url.to_string(),
            message: format!(
                "authentication/authorization failed.\n- Check the API key or token (MF_API_KEY / MF_TOKEN or .meteofrancerc)\n- Ensure the application is subscribed to this API on the Météo-France portal\n\nServer message: {}",
                message
            ),
        };
    }

    Error::Api {
        status: status.as_u16(),
        url: url.to_string(),
        message,
    }
}
