use crate::config::{EndpointConfig, RetryPolicy};
use crate::errors::MortarError;
use crate::observer::ClientObserver;
use crate::retry::with_retry;
use crate::wire::decode_response;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use polars::prelude::DataFrame;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

pub const QUERY_PATH: &str = "query";
pub const DEFAULT_START: &str = "1970-01-01T00:00:00Z";
pub const DEFAULT_END: &str = "2100-01-01T00:00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Raw,
    Mean,
    Min,
    Max,
    Count,
    Sum,
}

impl Aggregation {
    /// The `agg` parameter value. Raw retrieval sends no parameter.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            Aggregation::Raw => None,
            Aggregation::Mean => Some("mean"),
            Aggregation::Min => Some("min"),
            Aggregation::Max => Some("max"),
            Aggregation::Count => Some("count"),
            Aggregation::Sum => Some("sum"),
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_param().unwrap_or("raw"))
    }
}

impl FromStr for Aggregation {
    type Err = MortarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Aggregation::Raw),
            "mean" => Ok(Aggregation::Mean),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum),
            other => Err(MortarError::ConfigError(format!(
                "Unknown aggregation function {}",
                other
            ))),
        }
    }
}

/// An aggregation function and its bucket width (e.g. `"15m"`). The service
/// requires both or neither, so they travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationWindow {
    pub aggregation: Aggregation,
    pub window: String,
}

impl AggregationWindow {
    pub fn new(aggregation: Aggregation, window: &str) -> AggregationWindow {
        AggregationWindow {
            aggregation,
            window: window.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSelector {
    Sparql {
        query: String,
        source: Option<String>,
    },
    Uris(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub selector: DataSelector,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub aggregation: Option<AggregationWindow>,
}

impl DataRequest {
    pub fn sparql(query: &str) -> DataRequest {
        DataRequest {
            selector: DataSelector::Sparql {
                query: query.to_string(),
                source: None,
            },
            start: None,
            end: None,
            aggregation: None,
        }
    }

    pub fn uris(uris: Vec<String>) -> DataRequest {
        DataRequest {
            selector: DataSelector::Uris(uris),
            start: None,
            end: None,
            aggregation: None,
        }
    }

    pub fn with_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DataRequest {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Option<AggregationWindow>) -> DataRequest {
        self.aggregation = aggregation;
        self
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![];
        match &self.selector {
            DataSelector::Sparql { query, source } => {
                params.push(("sparql", query.clone()));
                if let Some(source) = source {
                    params.push(("source", source.clone()));
                }
            }
            DataSelector::Uris(uris) => {
                for uri in uris {
                    params.push(("uri", uri.clone()));
                }
            }
        }
        params.push((
            "start",
            self.start
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| DEFAULT_START.to_string()),
        ));
        params.push((
            "end",
            self.end
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| DEFAULT_END.to_string()),
        ));
        if let Some(AggregationWindow {
            aggregation,
            window,
        }) = &self.aggregation
        {
            if let Some(agg) = aggregation.as_param() {
                params.push(("agg", agg.to_string()));
                params.push(("window", window.clone()));
            }
        }
        params
    }
}

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Query metadata, stream metadata and timeseries data of one request.
#[derive(Debug, Clone)]
pub struct Dataset {
    sparql_metadata: Option<DataFrame>,
    stream_metadata: DataFrame,
    data: DataFrame,
}

impl Dataset {
    pub fn new(
        sparql_metadata: Option<DataFrame>,
        stream_metadata: DataFrame,
        data: DataFrame,
    ) -> Dataset {
        Dataset {
            sparql_metadata,
            stream_metadata,
            data,
        }
    }

    pub fn sparql_metadata(&self) -> Option<&DataFrame> {
        self.sparql_metadata.as_ref()
    }

    pub fn stream_metadata(&self) -> &DataFrame {
        &self.stream_metadata
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }
}

#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Returns the stream metadata table and the data table.
    async fn fetch(&self, request: &DataRequest) -> Result<(DataFrame, DataFrame), MortarError>;
}

pub struct HttpDataFetcher {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    retry: RetryPolicy,
    max_decompressed_bytes: u64,
    observer: Arc<dyn ClientObserver>,
}

impl HttpDataFetcher {
    pub fn new(
        client: reqwest::Client,
        endpoint: EndpointConfig,
        retry: RetryPolicy,
        max_decompressed_bytes: u64,
        observer: Arc<dyn ClientObserver>,
    ) -> HttpDataFetcher {
        HttpDataFetcher {
            client,
            endpoint,
            retry,
            max_decompressed_bytes,
            observer,
        }
    }

    async fn send(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>, MortarError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(MortarError::DataRequestError {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DataFetcher for HttpDataFetcher {
    async fn fetch(&self, request: &DataRequest) -> Result<(DataFrame, DataFrame), MortarError> {
        let url = self.endpoint.url(QUERY_PATH);
        let params = request.query_params();
        self.observer.request("data request", &url);
        let body = with_retry(&self.retry, MortarError::is_transient, || {
            self.send(&url, &params)
        })
        .await?;
        decode_response(&body, self.max_decompressed_bytes)
    }
}
