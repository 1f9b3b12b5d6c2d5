use polars::prelude::PolarsError;
use sparql_gateway::SparqlQueryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MortarError {
    #[error("Transport error `{0}`")]
    TransportError(#[from] reqwest::Error),
    #[error("Request to `{url}` failed with status {status}: {body}")]
    BadStatusCode {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Data request failed with status {status}: {body}")]
    DataRequestError { status: u16, body: String },
    #[error(transparent)]
    QueryExecutionError(#[from] SparqlQueryError),
    #[error("Qualify returned no sites")]
    EmptyQualifyResult,
    #[error("Malformed qualify response: {0}")]
    MalformedQualifyResponse(String),
    #[error("Variables {missing:?} are not projected by view `{view}`")]
    InvalidDataVars { view: String, missing: Vec<String> },
    #[error("Could not rewrite view query `{0}`")]
    RewriteError(String),
    #[error("Timeseries in dataframe `{dataframe}` references undeclared view `{view}`")]
    UnknownView { dataframe: String, view: String },
    #[error("Dataframe `{0}` declares no timeseries")]
    EmptyDataFrame(String),
    #[error("Timeseries data for dataframe `{dataframe}` has schema {found}, expected {expected}")]
    SchemaMismatch {
        dataframe: String,
        expected: String,
        found: String,
    },
    #[error("Could not decompress data response `{0}`")]
    DecompressionError(std::io::Error),
    #[error("Decompressed data response exceeds {0} bytes")]
    DecompressedSizeExceeded(u64),
    #[error("Could not decode stream metadata `{0}`")]
    MetadataDecodeError(PolarsError),
    #[error("Could not decode timeseries data `{0}`")]
    DataDecodeError(PolarsError),
    #[error("Error building table `{0}`")]
    DataFrameError(PolarsError),
    #[error("The client owning this stream has been dropped")]
    ClientDropped,
    #[error("Stream `{0}` has no URI")]
    MissingStreamUri(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MortarError {
    /// Connection and timeout failures, the only errors retried on reads.
    pub fn is_transient(&self) -> bool {
        match self {
            MortarError::TransportError(e) => e.is_connect() || e.is_timeout(),
            MortarError::QueryExecutionError(e) => e.is_transient(),
            _ => false,
        }
    }
}
