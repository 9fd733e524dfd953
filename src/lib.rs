pub mod builder;
pub mod config;
pub mod logging;
pub mod ols;
pub mod replication;
pub mod segment;
pub mod session;
pub mod store;
pub mod value;

pub use config::Config;
pub use session::Session;
pub use value::Value;

/// The single error type threaded through every component of the replication engine.
///
/// Variants map directly onto the error taxonomy: caller-facing errors
/// (`TypeMismatch`, `DdlTypeMismatch`, `Config`) abort the current transaction
/// without touching the LSN; `WriterRaced` and `ReplayFailed` describe the two
/// ways a node can fall behind its peers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid type for parameter {field}: expected kind '{expected}', got {got}")]
    TypeMismatch {
        field: String,
        expected: char,
        got: &'static str,
    },

    #[error("cannot rename column {src} to {dst}: destination kind must match source kind")]
    DdlTypeMismatch { src: String, dst: String },

    #[error("column or parameter name {0:?} does not start with a recognized kind prefix (i/f/t/b)")]
    UnknownKind(String),

    #[error("segment {lsn} already exists at {key}")]
    SegmentExists { lsn: u64, key: String },

    #[error("commit lost the race for lsn {lsn}; statements discarded, converging via sync")]
    WriterRaced { lsn: u64 },

    #[error("failed to apply segment at lsn {lsn}: {cause}")]
    ReplayFailed {
        lsn: u64,
        #[source]
        cause: Box<Error>,
    },

    #[error("segment at lsn {lsn} is invalid: {reason}")]
    InvalidSegment { lsn: u64, reason: String },

    #[error("object store I/O failed after retrying: {0}")]
    TransientIo(#[from] opendal::Error),

    #[error("failed to read or parse config file {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
