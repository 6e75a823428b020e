//! Secret redaction for anything printed or logged.

/// Show only the last 4 characters of a secret.
///
/// Returns `"...XXXX"` if the secret is long enough, or `"****"` if too short
/// to reveal anything safely.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() >= 12 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("...{tail}")
    } else {
        "****".to_string()
    }
}

/// Redact an optional secret, rendering absence as `"(not set)"`.
pub fn redact_opt(secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => redact(s),
        _ => "(not set)".to_string(),
    }
}
