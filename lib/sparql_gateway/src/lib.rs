pub mod endpoint;
pub mod results;

use async_trait::async_trait;
use endpoint::SparqlEndpointQueryExecutionError;
use log::debug;
use polars::prelude::{
    concat_lf_diagonal, DataFrame, IntoLazy, NamedFrom, PolarsError, Series, UnionArgs,
};
use thiserror::Error;

pub const SITE_COLUMN: &str = "site";

#[derive(Debug, Error)]
pub enum SparqlQueryError {
    #[error(transparent)]
    SparqlEndpointQueryExecutionError(#[from] SparqlEndpointQueryExecutionError),
    #[error("Error building SPARQL result table `{0}`")]
    DataFrameError(#[from] PolarsError),
}

impl SparqlQueryError {
    pub fn is_transient(&self) -> bool {
        match self {
            SparqlQueryError::SparqlEndpointQueryExecutionError(e) => e.is_transient(),
            SparqlQueryError::DataFrameError(_) => false,
        }
    }
}

/// Executes SPARQL against the remote service, optionally scoped to sites.
#[async_trait]
pub trait SparqlGateway: Send + Sync {
    /// Runs one query against one scope. `None` is the unscoped endpoint.
    async fn execute(&self, query: &str, site: Option<&str>) -> Result<DataFrame, SparqlQueryError>;

    /// Runs the query unscoped, or once per site with a `site` column appended
    /// to every per-site table. Per-site tables are concatenated in the order
    /// of `sites`; columns missing from some sites are filled with nulls.
    async fn query(
        &self,
        query: &str,
        sites: Option<&[String]>,
    ) -> Result<DataFrame, SparqlQueryError> {
        let sites = match sites {
            None => return self.execute(query, None).await,
            Some(sites) => sites,
        };
        if sites.is_empty() {
            return Ok(DataFrame::empty());
        }
        let mut site_frames = vec![];
        for site in sites {
            let mut df = self.execute(query, Some(site)).await?;
            let site_column = Series::new(SITE_COLUMN, vec![site.as_str(); df.height()]);
            df.with_column(site_column)?;
            debug!("Site {} returned {} rows", site, df.height());
            site_frames.push(df.lazy());
        }
        let df = concat_lf_diagonal(site_frames, UnionArgs::default())?.collect()?;
        Ok(df)
    }
}
