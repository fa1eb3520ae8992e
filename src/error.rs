use camino::Utf8PathBuf;

use crate::edition::Edition;

/// Error types for the georegion library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file is missing, unreadable or not a valid database.
    #[error("can not open database: {path}")]
    CannotOpenDatabase {
        path: Utf8PathBuf,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// The database opened fine but does not carry region data.
    #[error("not a region database: {path} (edition {edition})")]
    NotRegionDatabase { path: Utf8PathBuf, edition: Edition },

    /// The host resolved, but the database has no region record for it.
    #[error("can not find match data for {host}")]
    NoMatchFound { host: String },

    /// An asynchronous lookup was issued without a completion callback.
    #[error("lookup requires a callback")]
    MissingCallback,

    /// The handle was closed before the lookup was issued.
    #[error("database handle is closed")]
    HandleClosed,

    /// Reading the record out of the database failed.
    #[error("lookup failed for {host}")]
    LookupFailed {
        host: String,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// Asynchronous lookups need a tokio runtime to run on.
    #[error("asynchronous lookup issued outside of a tokio runtime")]
    NoRuntime,
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
