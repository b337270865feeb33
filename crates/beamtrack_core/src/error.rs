use thiserror::Error;

/// Fatal configuration and binding errors. None of these are retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("no math backend registered for representation `{representation}`")]
    UnsupportedBackend { representation: &'static str },

    #[error("unknown element kind `{kind}`")]
    UnknownElementKind { kind: String },

    #[error("element kind `{kind}` has no attribute `{attribute}`")]
    UnknownAttribute { kind: String, attribute: String },

    #[error("element kind `{kind}` requires attribute `{attribute}`")]
    MissingAttribute {
        kind: &'static str,
        attribute: &'static str,
    },

    #[error("NUM_STEPS must be a positive integer, got {value}")]
    InvalidSliceCount { value: f64 },

    #[error("subdivision count must be at least 1, got {value}")]
    InvalidSubdivision { value: usize },
}
