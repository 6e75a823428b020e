/// Errors from the CI provider layer.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("CI API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid repository {0:?}, expected owner/name")]
    InvalidRepo(String),

    #[error("Log archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Invalid(#[from] tourgen_core::error::CoreError),
}
