//! Error taxonomy for the ingestion pipeline.
//!
//! Only [`IngestError::FatalPrecondition`] ever aborts a run. Everything
//! else is page-local ([`FetchError`]) or record-local ([`Rejection`], write
//! failures) and ends up as a counter in the run summary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The run cannot start or cannot make any progress at all.
    #[error("fatal precondition: {0}")]
    FatalPrecondition(String),
}

/// Why a page fetch produced no records.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure. `connect` is set when no connection could be made.
    #[error("transport error: {message}")]
    Transport { message: String, connect: bool },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("could not decode page: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_connect(&self) -> bool {
        matches!(self, FetchError::Transport { connect: true, .. })
    }
}

/// Why a single upstream record was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("record is not a readable object: {0}")]
    Malformed(String),

    #[error("brand is missing or empty")]
    MissingBrand,

    #[error("colorway is missing or empty")]
    MissingColorway,

    #[error("no primary image to re-host")]
    MissingImage,

    #[error("image upload failed: {0}")]
    AssetUpload(String),
}

impl Rejection {
    /// Stable reason code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Malformed(_) => "malformed_record",
            Rejection::MissingBrand => "missing_brand",
            Rejection::MissingColorway => "missing_colorway",
            Rejection::MissingImage => "missing_image",
            Rejection::AssetUpload(_) => "asset_upload_failed",
        }
    }
}

/// Failure reported by an [`AssetHost`](crate::traits::AssetHost) upload.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AssetUploadError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Rejection::MissingBrand.code(), "missing_brand");
        assert_eq!(Rejection::MissingColorway.code(), "missing_colorway");
        assert_eq!(
            Rejection::AssetUpload("502".into()).code(),
            "asset_upload_failed"
        );
    }

    #[test]
    fn only_connect_transport_errors_are_connect() {
        let refused = FetchError::Transport {
            message: "connection refused".into(),
            connect: true,
        };
        assert!(refused.is_connect());
        assert!(!FetchError::Status(500).is_connect());
        assert!(!FetchError::Timeout(30).is_connect());
    }
}
