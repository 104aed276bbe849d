//! The `error` module creates a library-specific Error type `GeocodeError`, and an alias for
//! Result using the `GeocodeError`, called `GeocodeResult`.
use std::path::PathBuf;
use thiserror::Error;

/// The `GeocodeError` enum represents the library-specific Error type.
///
/// The query path never produces an error: unknown or missing inputs surface through the
/// quality code of [`crate::Geocoded`]. Errors occur while downloading, building or opening
/// the database.
#[derive(Error, Debug)]
pub enum GeocodeError {
    /// The raw data directory does not exist, so there is nothing to index.
    #[error("Raw data directory {0:?} is missing.")]
    MissingRawData(PathBuf),
    /// A table file length is not a whole number of records.
    #[error("Table file {path:?} has {len} bytes, not a multiple of the {record}-byte record.")]
    CorruptTable {
        /// Path of the offending table file.
        path: PathBuf,
        /// Observed file length in bytes.
        len: u64,
        /// Expected record size in bytes.
        record: usize,
    },
    /// A download did not complete.
    #[error("Download of {0} failed: {1}")]
    Download(String, String),
    /// An expected department archive is absent from the raw directory.
    #[error("Archive {0:?} is missing; run the download step first.")]
    MissingArchive(PathBuf),
    /// Error conversion type for [`csv::Error`].
    #[error("Malformed csv input.")]
    Csv(#[from] csv::Error),
    /// Error conversion type for [`std::io::Error`].
    #[error("Input/output error from std.")]
    Io(#[from] std::io::Error),
}

/// Alias for the Result type using the local Error type.
pub type GeocodeResult<T> = Result<T, GeocodeError>;
