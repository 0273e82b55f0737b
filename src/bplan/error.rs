use thiserror::Error;

/// An error that can occur when converting BPLAN data.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Input/Output error while reading or writing a file
    #[error("impossible to read file")]
    IO(#[from] std::io::Error),
    /// Impossible to open or read a named file
    #[error("impossible to read '{file_name}'")]
    NamedFileIO {
        /// The file name that could not be read
        file_name: String,
        /// The inital error that caused the unability to read the file
        #[source]
        source: std::io::Error,
    },
    /// Impossible to split the file into tab separated records
    #[error("impossible to read records from '{file_name}'")]
    CSVError {
        /// File name that could not be split into records
        file_name: String,
        /// The initial error by the csv library
        #[source]
        source: csv::Error,
    },
    /// The first field of a line is not a known record type
    #[error("line {line}: unknown record type '{record_type}'")]
    UnknownRecordType { line: u64, record_type: String },
    /// Only inserts can be applied, amendments and deletions cannot
    #[error("line {line}: unsupported action '{action}' for {record_type} record")]
    UnsupportedAction {
        line: u64,
        record_type: String,
        action: String,
    },
    /// A record does not have as many fields as its layout
    #[error("line {line}: {record_type} record has {found} fields, expected {expected}")]
    FieldCount {
        line: u64,
        record_type: String,
        expected: usize,
        found: usize,
    },
    /// A field could not be converted to its column type
    #[error("line {line}: invalid {record_type} record")]
    InvalidRecord {
        line: u64,
        record_type: String,
        /// The initial error by the csv deserializer
        #[source]
        source: csv::Error,
        /// The line that could not be converted
        line_in_error: LineError,
    },
    /// The trailer is not made of groups of four fields
    #[error("line {line}: malformed trailer: {reason}")]
    MalformedTrailer { line: u64, reason: String },
    /// The trailer disagrees with the number of records read
    #[error("inconsistent {record_type} counts, expected {expected}, got {actual}")]
    CountMismatch {
        record_type: String,
        expected: u64,
        actual: u64,
    },
    /// The trailer announces amendments or deletions
    #[error("trailer announces amended or deleted {record_type} records")]
    UnsupportedTrailerCounts { record_type: String },
    /// The converted database could not be moved to its final path
    #[error("impossible to write '{path}'")]
    Persist {
        path: String,
        #[source]
        source: tempfile::PersistError,
    },
    /// Error when querying sqlite
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),
    /// Error when reading or writing the metadata file
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Specific line from a BPLAN file that could not be converted
#[derive(Debug)]
pub struct LineError {
    /// Field names of the record layout
    pub headers: Vec<String>,
    /// Values of the line that could not be converted
    pub values: Vec<String>,
}
