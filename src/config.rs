use std::path::{Path, PathBuf};

use crate::client::ClientConfig;
use crate::error::{Error, Result};

pub(crate) const DEFAULT_API_URL: &str = "https://public-api.meteofrance.fr/public/";

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    api_key: Option<String>,
    token: Option<String>,
    application_id: Option<String>,
    verify: Option<bool>,
}

/// Resolves the client configuration, in order of precedence:
/// - explicit values already set on `explicit`
/// - environment variables `MF_API_URL`, `MF_API_KEY`, `MF_TOKEN`, `MF_APPLICATION_ID`
/// - config file from `MF_RC`, `./.meteofrancerc` or `~/.meteofrancerc`
pub(crate) fn load_config(explicit: ClientConfig) -> Result<ClientConfig> {
    let mut cfg = explicit;
    fill_from_env(&mut cfg);

    let rc_candidates = rc_candidates();
    if !has_credentials(&cfg) || cfg.url.is_none() {
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                let rc = read_rc(rc_path).map_err(|e| {
                    Error::Config(format!(
                        "failed to read configuration file {}: {}",
                        rc_path.display(),
                        e
                    ))
                })?;
                merge_rc(&mut cfg, rc);
                break;
            }
        }
    }

    if !has_credentials(&cfg) {
        let hint = if rc_candidates.is_empty() {
            ".meteofrancerc".to_string()
        } else {
            rc_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Err(Error::Config(format!(
            "missing credentials: set one of MF_API_KEY, MF_TOKEN or MF_APPLICATION_ID, \
             or put `api_key:`/`token:`/`application_id:` in one of: {}",
            hint
        )));
    }

    Ok(cfg)
}

fn has_credentials(cfg: &ClientConfig) -> bool {
    cfg.api_key.is_some() || cfg.token.is_some() || cfg.application_id.is_some()
}

fn fill_from_env(cfg: &mut ClientConfig) {
    if cfg.url.is_none() {
        cfg.url = std::env::var("MF_API_URL").ok();
    }
    if cfg.api_key.is_none() {
        cfg.api_key = std::env::var("MF_API_KEY").ok();
    }
    if cfg.token.is_none() {
        cfg.token = std::env::var("MF_TOKEN").ok();
    }
    if cfg.application_id.is_none() {
        cfg.application_id = std::env::var("MF_APPLICATION_ID").ok();
    }
}

fn merge_rc(cfg: &mut ClientConfig, rc: RcConfig) {
    if cfg.url.is_none() {
        cfg.url = rc.url;
    }
    if !has_credentials(cfg) {
        cfg.api_key = rc.api_key;
        cfg.token = rc.token;
        cfg.application_id = rc.application_id;
    }
    if let Some(verify) = rc.verify {
        cfg.verify = verify;
    }
}

fn read_rc(path: &Path) -> std::io::Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `key:` is on one line and the value is on the next line.
    let mut pending_key: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                assign(&mut cfg, &pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if !v.is_empty() {
                assign(&mut cfg, k, v);
            } else {
                pending_key = Some(k.to_string());
            }
        }
    }

    cfg
}

fn assign(cfg: &mut RcConfig, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    match key {
        "url" => cfg.url = Some(value.to_string()),
        "api_key" | "apikey" => cfg.api_key = Some(value.to_string()),
        "token" => cfg.token = Some(value.to_string()),
        "application_id" => cfg.application_id = Some(value.to_string()),
        "verify" => cfg.verify = Some(value != "0"),
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    if let Ok(p) = std::env::var("MF_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".meteofrancerc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".meteofrancerc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_and_continuation_values() {
        let rc = parse_rc(
            "# comment\nurl: https://example.org/public/\napi_key:\n  \"abc123\"\nverify: 0\n",
        );
        assert_eq!(rc.url.as_deref(), Some("https://example.org/public/"));
        assert_eq!(rc.api_key.as_deref(), Some("abc123"));
        assert_eq!(rc.verify, Some(false));
        assert_eq!(rc.token, None);
    }

    #[test]
    fn reads_rc_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".meteofrancerc");
        std::fs::write(&path, "application_id: 'Zm9vOmJhcg=='\n").unwrap();
        let rc = read_rc(&path).unwrap();
        assert_eq!(rc.application_id.as_deref(), Some("Zm9vOmJhcg=="));
    }

    #[test]
    fn explicit_credentials_win_over_rc() {
        let mut cfg = ClientConfig {
            api_key: Some("explicit".into()),
            ..ClientConfig::default()
        };
        merge_rc(
            &mut cfg,
            RcConfig {
                token: Some("from-file".into()),
                ..RcConfig::default()
            },
        );
        assert_eq!(cfg.api_key.as_deref(), Some("explicit"));
        assert_eq!(cfg.token, None);
    }
}
