use crate::codec::CodecError;
use crate::store::StoreError;

/// Errors returned by request tracking and session handling.
///
/// [`Error::NoTrackedRequest`] and [`Error::NoSession`] are the "not logged in
/// yet" outcomes; everything else is a failure the caller should surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No tracking cookie, or an empty one, for the requested index.
    #[error("no tracked request for this index")]
    NoTrackedRequest,

    /// No usable session cookie (absent, empty, or undecodable).
    #[error("saml: session not present")]
    NoSession,

    /// A tracking cookie decoded to a request belonging to another index.
    #[error("expected index {expected:?}, got {actual:?}")]
    IndexMismatch { expected: String, actual: String },

    #[error("cookie store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the outcomes that mean "authenticate first" rather than failure.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::NoTrackedRequest | Self::NoSession)
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        match self {
            Self::NoTrackedRequest | Self::NoSession => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::IndexMismatch { .. } | Self::Codec(_) => {
                tracing::warn!(error = %self, "Rejected SAML cookie");
                StatusCode::FORBIDDEN.into_response()
            }
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "SAML internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
