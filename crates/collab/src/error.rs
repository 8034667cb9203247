//! Error types for the collaboration client

/// Errors surfaced synchronously by the collaboration client.
///
/// Runtime transport failures never reach callers through `Result`:
/// they are absorbed by the reconnect policy or surfaced as `error`
/// events. These variants cover configuration problems only.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme `{0}` (expected http, https, ws, or wss)")]
    UnsupportedScheme(String),
}
