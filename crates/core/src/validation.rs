//! Small input checks shared by the clients.

use crate::error::CoreError;

/// Validate that a URL is non-empty and uses `http` or `https`.
pub fn validate_http_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("URL must not be empty".to_string()));
    }
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        Some(_) => Err(CoreError::Validation(format!(
            "URL has no host: '{trimmed}'"
        ))),
        None => Err(CoreError::Validation(format!(
            "URL must start with http:// or https://, got: '{trimmed}'"
        ))),
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Last path segment of a URL, without query string or fragment.
///
/// Falls back to `"download"` if no meaningful segment is found.
pub fn filename_from_url(url: &str) -> String {
    let clean = url.split(['?', '#']).next().unwrap_or(url);
    let path = match clean
        .strip_prefix("https://")
        .or_else(|| clean.strip_prefix("http://"))
    {
        Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => clean,
    };
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_http_url("https://example.com/a.jpg").is_ok());
        assert!(validate_http_url(" http://localhost:8000 ").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_empty() {
        assert!(validate_http_url("").is_err());
        assert!(validate_http_url("ftp://example.com").is_err());
        assert!(validate_http_url("example.com/a.jpg").is_err());
        assert!(validate_http_url("https://").is_err());
        assert!(validate_http_url("https:///path").is_err());
    }

    #[test]
    fn join_url_normalises_slashes() {
        assert_eq!(join_url("http://h/", "/api/x"), "http://h/api/x");
        assert_eq!(join_url("http://h", "api/x"), "http://h/api/x");
    }

    #[test]
    fn filename_from_url_strips_query() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/v1/tour.mp4?sig=abc#t=3"),
            "tour.mp4"
        );
        assert_eq!(filename_from_url("https://cdn.example.com/"), "download");
        assert_eq!(filename_from_url("https://cdn.example.com"), "download");
    }
}
