use super::{SparqlGateway, SparqlQueryError};
use crate::results::parse_json_results;
use async_trait::async_trait;
use log::debug;
use polars::prelude::DataFrame;
use reqwest::header::{ACCEPT, USER_AGENT};
use sparesults::QueryResultsSyntaxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SparqlEndpointQueryExecutionError {
    #[error(transparent)]
    RequestError(reqwest::Error),
    #[error("SPARQL query failed with status `{status}`: {body}")]
    QueryExecutionError { status: u16, body: String },
    #[error("Results parse error `{0}`")]
    ResultsParseError(QueryResultsSyntaxError),
    #[error("Solution parse error `{0}`")]
    SolutionParseError(QueryResultsSyntaxError),
    #[error("Wrong result type, expected solutions")]
    WrongResultType,
}

impl SparqlEndpointQueryExecutionError {
    /// Connection and timeout failures, which are safe to retry for reads.
    pub fn is_transient(&self) -> bool {
        match self {
            SparqlEndpointQueryExecutionError::RequestError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Mortar's `/sparql` endpoint. Site scoping is the `site` query parameter.
pub struct SparqlEndpoint {
    pub endpoint: String,
    client: reqwest::Client,
}

impl SparqlEndpoint {
    pub fn new(endpoint: String, client: reqwest::Client) -> SparqlEndpoint {
        SparqlEndpoint { endpoint, client }
    }
}

#[async_trait]
impl SparqlGateway for SparqlEndpoint {
    async fn execute(&self, query: &str, site: Option<&str>) -> Result<DataFrame, SparqlQueryError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/sparql-results+json,application/json")
            .header(USER_AGENT, "mortar")
            .query(&[("query", query)]);
        if let Some(site) = site {
            request = request.query(&[("site", site)]);
        }
        debug!("SPARQL query on site {:?}: {}", site, query);
        let response = request
            .send()
            .await
            .map_err(SparqlEndpointQueryExecutionError::RequestError)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(SparqlEndpointQueryExecutionError::RequestError)?;
        if !status.is_success() {
            return Err(SparqlEndpointQueryExecutionError::QueryExecutionError {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }
            .into());
        }
        parse_json_results(&body)
    }
}
