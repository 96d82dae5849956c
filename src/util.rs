/// Gateway statuses worth retrying with a fixed delay.
pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 502 | 503 | 504)
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

/// Renders a bound the way coordinates appear in cache file names:
/// integral values lose their fractional part (`-12`, `16`), others keep
/// their shortest representation (`37.5`, `41.33356`).
pub(crate) fn format_coordinate(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urljoin_handles_slashes() {
        assert_eq!(urljoin("https://a/b/", "/c"), "https://a/b/c");
        assert_eq!(urljoin("https://a/b", "c/d"), "https://a/b/c/d");
        assert_eq!(urljoin("https://a/b", "https://z/y"), "https://z/y");
    }

    #[test]
    fn coordinates_drop_integral_fraction() {
        assert_eq!(format_coordinate(37.5), "37.5");
        assert_eq!(format_coordinate(-12.0), "-12");
        assert_eq!(format_coordinate(41.33356), "41.33356");
    }

    #[test]
    fn only_gateway_errors_retry() {
        assert!(retriable_status(503));
        assert!(!retriable_status(404));
        assert!(!retriable_status(500));
    }
}
