use crate::config::{EndpointConfig, RetryPolicy};
use crate::errors::MortarError;
use crate::observer::ClientObserver;
use crate::retry::with_retry;
use async_trait::async_trait;
use indexmap::IndexMap;
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const QUALIFY_PATH: &str = "qualify";

/// Queries submitted to qualify, either bare or keyed by a label.
#[derive(Debug, Clone, PartialEq)]
pub enum QualifyQueries {
    Unnamed(Vec<String>),
    Named(IndexMap<String, String>),
}

impl QualifyQueries {
    /// Mapping keys in declaration order, or `Query_0 .. Query_{n-1}`.
    pub fn labels(&self) -> Vec<String> {
        match self {
            QualifyQueries::Unnamed(queries) => {
                (0..queries.len()).map(|i| format!("Query_{}", i)).collect()
            }
            QualifyQueries::Named(queries) => queries.keys().cloned().collect(),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        match self {
            QualifyQueries::Unnamed(queries) => queries.clone(),
            QualifyQueries::Named(queries) => queries.values().cloned().collect(),
        }
    }
}

impl From<Vec<String>> for QualifyQueries {
    fn from(queries: Vec<String>) -> Self {
        QualifyQueries::Unnamed(queries)
    }
}

impl From<Vec<&str>> for QualifyQueries {
    fn from(queries: Vec<&str>) -> Self {
        QualifyQueries::Unnamed(queries.into_iter().map(|q| q.to_string()).collect())
    }
}

impl From<IndexMap<String, String>> for QualifyQueries {
    fn from(queries: IndexMap<String, String>) -> Self {
        QualifyQueries::Named(queries)
    }
}

impl From<Vec<(&str, &str)>> for QualifyQueries {
    fn from(queries: Vec<(&str, &str)>) -> Self {
        QualifyQueries::Named(
            queries
                .into_iter()
                .map(|(name, query)| (name.to_string(), query.to_string()))
                .collect(),
        )
    }
}

/// The `/qualify` answer: one boolean per submitted query for every site.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct QualifyResponse {
    pub per_site_booleans: IndexMap<String, Vec<bool>>,
}

impl QualifyResponse {
    pub fn from_slice(body: &[u8]) -> Result<QualifyResponse, MortarError> {
        serde_json::from_slice(body)
            .map_err(|x| MortarError::MalformedQualifyResponse(x.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifyResult {
    columns: Vec<String>,
    per_site: IndexMap<String, Vec<bool>>,
}

impl QualifyResult {
    pub fn new(response: QualifyResponse, columns: Vec<String>) -> Result<QualifyResult, MortarError> {
        let per_site = response.per_site_booleans;
        if per_site.is_empty() {
            return Err(MortarError::EmptyQualifyResult);
        }
        for (site, values) in &per_site {
            if values.len() != columns.len() {
                return Err(MortarError::MalformedQualifyResponse(format!(
                    "site {} has {} results for {} queries",
                    site,
                    values.len(),
                    columns.len()
                )));
            }
        }
        Ok(QualifyResult { columns, per_site })
    }

    /// Sites satisfying every query, in response order.
    pub fn sites(&self) -> Vec<String> {
        self.per_site
            .iter()
            .filter(|(_, values)| values.iter().all(|v| *v))
            .map(|(site, _)| site.clone())
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn per_site(&self) -> &IndexMap<String, Vec<bool>> {
        &self.per_site
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, MortarError> {
        let mut series_vec = vec![Series::new(
            "site",
            self.per_site.keys().map(|s| s.as_str()).collect::<Vec<_>>(),
        )];
        for (i, c) in self.columns.iter().enumerate() {
            let values: Vec<bool> = self.per_site.values().map(|v| v[i]).collect();
            series_vec.push(Series::new(c, values));
        }
        DataFrame::new(series_vec).map_err(MortarError::DataFrameError)
    }
}

impl Display for QualifyResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_dataframe() {
            Ok(df) => write!(f, "{}", df),
            Err(e) => write!(f, "<Qualify results for {} sites: {}>", self.per_site.len(), e),
        }
    }
}

#[async_trait]
pub trait QualifyEngine: Send + Sync {
    /// Submits the queries as one batch, in order.
    async fn qualify_batch(&self, queries: &[String]) -> Result<QualifyResponse, MortarError>;
}

pub async fn qualify(
    engine: &dyn QualifyEngine,
    queries: QualifyQueries,
) -> Result<QualifyResult, MortarError> {
    let labels = queries.labels();
    let response = engine.qualify_batch(&queries.queries()).await?;
    QualifyResult::new(response, labels)
}

pub struct HttpQualifyEngine {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    retry: RetryPolicy,
    observer: Arc<dyn ClientObserver>,
}

impl HttpQualifyEngine {
    pub fn new(
        client: reqwest::Client,
        endpoint: EndpointConfig,
        retry: RetryPolicy,
        observer: Arc<dyn ClientObserver>,
    ) -> HttpQualifyEngine {
        HttpQualifyEngine {
            client,
            endpoint,
            retry,
            observer,
        }
    }

    async fn send(&self, queries: &[String]) -> Result<QualifyResponse, MortarError> {
        let url = self.endpoint.url(QUALIFY_PATH);
        self.observer.request("qualify", &url);
        let mut request = self.client.post(&url).json(queries);
        if let Some(api_key) = self.endpoint.api_key() {
            request = request.query(&[("apikey", api_key)]);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(MortarError::BadStatusCode {
                url,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        QualifyResponse::from_slice(&body)
    }
}

#[async_trait]
impl QualifyEngine for HttpQualifyEngine {
    async fn qualify_batch(&self, queries: &[String]) -> Result<QualifyResponse, MortarError> {
        with_retry(&self.retry, MortarError::is_transient, || self.send(queries)).await
    }
}
