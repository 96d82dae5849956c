use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{
    AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT,
};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_API_URL, load_config};
use crate::error::{ApiErrorResponse, Error, Result, format_api_error};
use crate::model::Model;
use crate::util::{retriable_status, urljoin};

const TOKEN_URL: &str = "https://portail-api.meteofrance.fr/token";
const INVALID_JWT_ERROR_CODE: &str = "900901";

/// Connection settings. Unset fields are filled from the environment and
/// `.meteofrancerc`, see [`Client::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, typically `https://public-api.meteofrance.fr/public/`.
    pub url: Option<String>,
    /// API key, sent as the `apikey` header.
    pub api_key: Option<String>,
    /// Bearer token (valid one hour).
    pub token: Option<String>,
    /// Base64 application id, exchanged for a fresh token when needed.
    pub application_id: Option<String>,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            token: None,
            application_id: None,
            verify: true,
        }
    }
}

/// A successful (HTTP 200) response body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            content_disposition: None,
            body: body.into(),
        }
    }

    /// `filename` announced by the `Content-Disposition` header, unquoted.
    pub fn filename(&self) -> Option<&str> {
        let (_, name) = self.content_disposition.as_deref()?.split_once("filename=")?;
        let name = name.split(';').next().unwrap_or(name).trim().trim_matches('"');
        (!name.is_empty()).then_some(name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The `GET` capability every service wrapper is built on.
///
/// `path` is relative to the API base URL. `params` may repeat a key
/// (WCS `subset` clauses).
pub trait Transport {
    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        (**self).get(path, params)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        (**self).get(path, params)
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Blocking HTTP client for the Météo-France API gateway.
#[derive(Debug)]
pub struct Client {
    url: String,
    api_key: Option<String>,
    application_id: Option<String>,
    token: Mutex<Option<String>>,

    timeout: Duration,
    max_retries: usize,
    retry_delay: Duration,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.meteofrancerc`.
    ///
    /// This is equivalent to `Client::new(ClientConfig::default())`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Creates a client using (in order of precedence):
    /// - explicit fields of `config`
    /// - environment variables `MF_API_URL` / `MF_API_KEY` / `MF_TOKEN` / `MF_APPLICATION_ID`
    /// - config file from `MF_RC` or `.meteofrancerc`
    ///
    /// With only an application id, a token is requested immediately.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, DEFAULT_API_URL)
    }

    /// Like [`Client::new`], but defaults the base URL to the one serving `model`.
    pub fn for_model(model: Model, config: ClientConfig) -> Result<Self> {
        Self::build(config, model.default_base_url())
    }

    fn build(config: ClientConfig, default_url: &str) -> Result<Self> {
        let cfg = load_config(config)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("meteofrance-wcs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("meteofrance-wcs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(60));

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build()?;

        let client = Self {
            url: cfg.url.unwrap_or_else(|| default_url.to_string()),
            api_key: cfg.api_key,
            application_id: cfg.application_id,
            token: Mutex::new(cfg.token),
            timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay: Duration::from_secs(5),
            http,
        };

        if client.api_key.is_none() && client.current_token().is_none() {
            debug!("no api key nor token, requesting a token with the application id");
            client.refresh_token()?;
        }

        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.url
    }

    fn current_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Requests a new token from the portal and caches it.
    ///
    /// Tokens last one hour; requesting a new one invalidates the previous one.
    pub fn refresh_token(&self) -> Result<String> {
        let application_id = self.application_id.as_deref().ok_or_else(|| {
            Error::Config("the token cannot be renewed without an application_id".into())
        })?;

        let resp = self
            .http
            .post(TOKEN_URL)
            .header(AUTHORIZATION, format!("Basic {}", application_id))
            .form(&[("grant_type", "client_credentials")])
            .timeout(Duration::from_secs(10))
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(status, TOKEN_URL, &text));
        }

        let token = resp.json::<TokenResponse>()?.access_token;
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.clone());
        Ok(token)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.api_key {
            req.header("apikey", key.trim())
        } else if let Some(token) = self.current_token() {
            req.bearer_auth(token.trim())
        } else {
            req
        }
    }
}

fn is_token_expired(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> bool {
    if status != StatusCode::UNAUTHORIZED {
        return false;
    }
    if !content_type.is_some_and(|ct| ct.contains("application/json")) {
        return false;
    }
    let text = String::from_utf8_lossy(body);
    ApiErrorResponse::parse(&text)
        .and_then(|e| e.code)
        .is_some_and(|code| code == INVALID_JWT_ERROR_CODE)
}

impl Transport for Client {
    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        let url = urljoin(&self.url, path);
        debug!(%url, "GET");

        let mut attempt = 0usize;
        while attempt < self.max_retries {
            let req = self.http.get(&url).query(params).timeout(self.timeout);
            let resp = self.apply_auth(req).send()?;

            let status = resp.status();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let content_disposition = resp
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.bytes()?.to_vec();

            if status == StatusCode::OK {
                debug!(%url, bytes = body.len(), "successful request");
                return Ok(ApiResponse {
                    url,
                    content_type,
                    content_disposition,
                    body,
                });
            }

            if is_token_expired(status, content_type.as_deref(), &body) {
                info!("token expired, requesting a new one");
                self.refresh_token()?;
                attempt += 1;
                continue;
            }

            if retriable_status(status.as_u16()) {
                attempt += 1;
                warn!(
                    %url,
                    status = status.as_u16(),
                    attempt,
                    max_retries = self.max_retries,
                    "service not available, retrying"
                );
                thread::sleep(self.retry_delay);
                continue;
            }

            let text = String::from_utf8_lossy(&body);
            error!(%url, status = status.as_u16(), "request failed");
            return Err(format_api_error(status, &url, &text));
        }

        Err(Error::ServiceUnavailable {
            url,
            attempts: attempt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_jwt_is_detected_from_gateway_code() {
        let body = br#"{"code":"900901","message":"Invalid Credentials"}"#;
        assert!(is_token_expired(
            StatusCode::UNAUTHORIZED,
            Some("application/json; charset=UTF-8"),
            body
        ));
        assert!(!is_token_expired(
            StatusCode::UNAUTHORIZED,
            Some("text/html"),
            body
        ));
        assert!(!is_token_expired(
            StatusCode::FORBIDDEN,
            Some("application/json"),
            body
        ));
    }

    #[test]
    fn response_helpers() {
        let resp = ApiResponse::new("u", br#"{"a": 1}"#.to_vec());
        assert_eq!(resp.text(), r#"{"a": 1}"#);
        let v: serde_json::Value = resp.json().unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn token_client_builds_without_network() {
        let client = Client::new(ClientConfig {
            token: Some("tok".into()),
            url: Some("https://example.invalid/public/".into()),
            ..ClientConfig::default()
        })
        .unwrap()
        .with_max_retries(1);
        assert_eq!(client.base_url(), "https://example.invalid/public/");
        assert_eq!(client.current_token().as_deref(), Some("tok"));
    }

    #[test]
    fn filename_from_content_disposition() {
        let mut resp = ApiResponse::new("u", b"png".to_vec());
        assert_eq!(resp.filename(), None);
        resp.content_disposition =
            Some(r#"attachment; filename="VIGNETTE_NATIONAL_J_500X500.png""#.into());
        assert_eq!(resp.filename(), Some("VIGNETTE_NATIONAL_J_500X500.png"));
        resp.content_disposition = Some("inline; filename=map.png; size=3".into());
        assert_eq!(resp.filename(), Some("map.png"));
    }
}
