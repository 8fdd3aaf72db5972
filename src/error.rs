//! Error kinds for the query pipeline and its external collaborators.
//!
//! Kinds follow the engine's propagation policy: `InvalidCoordinates`,
//! `ConversionFailed`, and `ParameterMissing` are caught at the request
//! boundary and reported to the client; `Internal` terminates the
//! current query but not the process; `OutOfMemory` and `CorruptFile`
//! (at section/arity granularity) are fatal to the load.

/// Errors that can occur while loading a database or serving a query.
#[derive(Debug)]
pub enum Error {
    /// Wrong tuple arity, an id outside its dimension, or an id not
    /// present in the addressed dimension.
    InvalidCoordinates(String),

    /// A numeric or identifier field failed to parse (trailing garbage).
    ConversionFailed(String),

    /// The database directory or a required file within it is missing.
    FileNotFound(String),

    /// A section-level or arity-level failure in a CSV database file.
    CorruptFile(String),

    /// Allocation failure considered unrecoverable.
    OutOfMemory(String),

    /// A required request parameter was absent or empty.
    ParameterMissing(String),

    /// An internal invariant was violated (cyclic hierarchy, packed-key
    /// width over 64 bits, out-of-range source in an `AggregationMap`).
    Internal(String),

    /// Reserved; unused in the query path.
    SplashDisabled,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::InvalidCoordinates(msg) => format!("invalid-coordinates: {msg}"),
            Self::ConversionFailed(msg) => format!("conversion-failed: {msg}"),
            Self::FileNotFound(msg) => format!("file-not-found: {msg}"),
            Self::CorruptFile(msg) => format!("corrupt-file: {msg}"),
            Self::OutOfMemory(msg) => format!("out-of-memory: {msg}"),
            Self::ParameterMissing(msg) => format!("parameter-missing: {msg}"),
            Self::Internal(msg) => format!("internal: {msg}"),
            Self::SplashDisabled => "splash-disabled".to_owned(),
        };
        write!(f, "Error: {message}")
    }
}

impl std::error::Error for Error {}

/// Whether this error should be caught at the request boundary and
/// reported to the client as a plain-text line, versus aborting the
/// current query (`Internal`) or the whole process (`OutOfMemory`).
impl Error {
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinates(_) | Self::ConversionFailed(_) | Self::ParameterMissing(_)
        )
    }
}

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
