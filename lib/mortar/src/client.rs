use crate::config::{ClientConfig, EndpointConfig, RetryPolicy};
use crate::data::{
    format_time, AggregationWindow, DataFetcher, DataRequest, DataSelector, Dataset,
    HttpDataFetcher,
};
use crate::errors::MortarError;
use crate::fetch::{FetchOrchestrator, FetchResult, FetchSpec};
use crate::observer::{ClientObserver, LogObserver};
use crate::qualify::{qualify, HttpQualifyEngine, QualifyEngine, QualifyQueries, QualifyResult};
use crate::retry::with_retry;
use crate::stream::{Stream, StreamDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::Serialize;
use sparql_gateway::endpoint::SparqlEndpoint;
use sparql_gateway::{SparqlGateway, SparqlQueryError};
use std::sync::Arc;

pub const SPARQL_PATH: &str = "sparql";
pub const MODEL_PATH: &str = "query/model";

#[derive(Debug, Serialize)]
struct ModelRequest<'a> {
    graph: &'a str,
    timestamp: String,
}

/// Composes the SPARQL, qualify and data capabilities.
pub struct Client {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    sparql_gateway: Arc<dyn SparqlGateway>,
    qualify_engine: Arc<dyn QualifyEngine>,
    data_fetcher: Arc<dyn DataFetcher>,
    observer: Arc<dyn ClientObserver>,
    max_concurrent_requests: usize,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        sparql_gateway: Arc<dyn SparqlGateway>,
        qualify_engine: Arc<dyn QualifyEngine>,
        data_fetcher: Arc<dyn DataFetcher>,
        observer: Arc<dyn ClientObserver>,
    ) -> Result<Client, MortarError> {
        let http = build_http_client(&config)?;
        Ok(Client {
            endpoint: config.endpoint,
            http,
            retry: config.retry,
            sparql_gateway,
            qualify_engine,
            data_fetcher,
            observer,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        })
    }

    pub fn from_config(config: ClientConfig) -> Result<Client, MortarError> {
        Client::from_config_with_observer(config, Arc::new(LogObserver))
    }

    pub fn from_config_with_observer(
        config: ClientConfig,
        observer: Arc<dyn ClientObserver>,
    ) -> Result<Client, MortarError> {
        let http = build_http_client(&config)?;
        let sparql_gateway: Arc<dyn SparqlGateway> = Arc::new(RetryingSparqlGateway {
            inner: SparqlEndpoint::new(config.endpoint.url(SPARQL_PATH), http.clone()),
            retry: config.retry.clone(),
        });
        let qualify_engine = Arc::new(HttpQualifyEngine::new(
            http.clone(),
            config.endpoint.clone(),
            config.retry.clone(),
            observer.clone(),
        ));
        let data_fetcher = Arc::new(HttpDataFetcher::new(
            http,
            config.endpoint.clone(),
            config.retry.clone(),
            config.max_decompressed_bytes,
            observer.clone(),
        ));
        Client::new(config, sparql_gateway, qualify_engine, data_fetcher, observer)
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub async fn sparql(
        &self,
        query: &str,
        sites: Option<&[String]>,
    ) -> Result<DataFrame, MortarError> {
        self.observer.request("sparql", &self.endpoint.url(SPARQL_PATH));
        self.sparql_gateway
            .query(query, sites)
            .await
            .map_err(|e| self.report("sparql", e.into()))
    }

    pub async fn qualify<Q: Into<QualifyQueries>>(
        &self,
        queries: Q,
    ) -> Result<QualifyResult, MortarError> {
        qualify(self.qualify_engine.as_ref(), queries.into())
            .await
            .map_err(|e| self.report("qualify", e))
    }

    pub async fn fetch(&self, spec: &FetchSpec) -> Result<FetchResult, MortarError> {
        let orchestrator = FetchOrchestrator::new(
            self.sparql_gateway.clone(),
            self.data_fetcher.clone(),
            self.observer.clone(),
            self.max_concurrent_requests,
        );
        orchestrator
            .fetch(spec)
            .await
            .map_err(|e| self.report("fetch", e))
    }

    /// Data selected by a SPARQL query, with the query's own results as
    /// SPARQL metadata.
    pub async fn data_sparql(
        &self,
        query: &str,
        source: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        aggregation: Option<AggregationWindow>,
    ) -> Result<Dataset, MortarError> {
        let sites = source.map(|s| vec![s.to_string()]);
        let sparql_metadata = self.sparql(query, sites.as_deref()).await?;
        let request = DataRequest {
            selector: DataSelector::Sparql {
                query: query.to_string(),
                source: source.map(|s| s.to_string()),
            },
            start,
            end,
            aggregation,
        };
        let (stream_metadata, data) = self
            .data_fetcher
            .fetch(&request)
            .await
            .map_err(|e| self.report("data", e))?;
        Ok(Dataset::new(Some(sparql_metadata), stream_metadata, data))
    }

    /// Data of explicitly identified streams.
    pub async fn data_uris(
        &self,
        uris: &[String],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        aggregation: Option<AggregationWindow>,
    ) -> Result<Dataset, MortarError> {
        let request = DataRequest::uris(uris.to_vec())
            .with_range(start, end)
            .with_aggregation(aggregation);
        let (stream_metadata, data) = self
            .data_fetcher
            .fetch(&request)
            .await
            .map_err(|e| self.report("data", e))?;
        Ok(Dataset::new(None, stream_metadata, data))
    }

    /// The serialized ontology graph `graph` as of `timestamp` (default now).
    pub async fn model(
        &self,
        graph: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>, MortarError> {
        let url = self.endpoint.url(MODEL_PATH);
        let body = ModelRequest {
            graph,
            timestamp: format_time(&timestamp.unwrap_or_else(Utc::now)),
        };
        self.observer.request("model", &url);
        with_retry(&self.retry, MortarError::is_transient, || {
            self.send_model_request(&url, &body)
        })
        .await
        .map_err(|e| self.report("model", e))
    }

    async fn send_model_request(
        &self,
        url: &str,
        body: &ModelRequest<'_>,
    ) -> Result<Vec<u8>, MortarError> {
        let mut request = self.http.post(url).json(body);
        if let Some(api_key) = self.endpoint.api_key() {
            request = request.query(&[("apikey", api_key)]);
        }
        let response = request.send().await?;
        let status = response.status();
        let content = response.bytes().await?;
        if !status.is_success() {
            return Err(MortarError::BadStatusCode {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&content).into_owned(),
            });
        }
        Ok(content.to_vec())
    }

    /// A handle for an existing stream. Nothing is registered server side.
    pub fn stream(self: &Arc<Self>, definition: StreamDefinition) -> Stream {
        Stream::new(Arc::downgrade(self), definition)
    }

    /// Every failed client operation is reported here, and only here.
    fn report(&self, operation: &str, error: MortarError) -> MortarError {
        self.observer.failure(operation, &error.to_string());
        error
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, MortarError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(MortarError::TransportError)
}

/// Retries connection and timeout failures of the wrapped gateway.
pub struct RetryingSparqlGateway<G: SparqlGateway> {
    pub inner: G,
    pub retry: RetryPolicy,
}

#[async_trait]
impl<G: SparqlGateway> SparqlGateway for RetryingSparqlGateway<G> {
    async fn execute(&self, query: &str, site: Option<&str>) -> Result<DataFrame, SparqlQueryError> {
        with_retry(&self.retry, SparqlQueryError::is_transient, || {
            self.inner.execute(query, site)
        })
        .await
    }
}
