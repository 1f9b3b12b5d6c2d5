use crate::data::{AggregationWindow, DataFetcher, DataRequest};
use crate::errors::MortarError;
use crate::observer::ClientObserver;
use crate::rewrite::rewrite;
use crate::views::{resolve_all, ResolvedView, ViewDefinition};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use log::debug;
use polars::prelude::DataFrame;
use sparql_gateway::SparqlGateway;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesSpec {
    pub view: String,
    pub data_vars: Vec<String>,
}

impl TimeseriesSpec {
    pub fn new(view: &str, data_vars: &[&str]) -> TimeseriesSpec {
        TimeseriesSpec {
            view: view.to_string(),
            data_vars: data_vars.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrameSpec {
    pub name: String,
    pub aggregation: Option<AggregationWindow>,
    pub timeseries: Vec<TimeseriesSpec>,
}

impl DataFrameSpec {
    pub fn new(
        name: &str,
        aggregation: Option<AggregationWindow>,
        timeseries: Vec<TimeseriesSpec>,
    ) -> DataFrameSpec {
        DataFrameSpec {
            name: name.to_string(),
            aggregation,
            timeseries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSpec {
    pub sites: Vec<String>,
    pub views: Vec<ViewDefinition>,
    pub data_frames: Vec<DataFrameSpec>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl FetchSpec {
    pub fn new(
        sites: Vec<String>,
        views: Vec<ViewDefinition>,
        data_frames: Vec<DataFrameSpec>,
    ) -> FetchSpec {
        FetchSpec {
            sites,
            views,
            data_frames,
            start: None,
            end: None,
        }
    }

    pub fn with_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> FetchSpec {
        self.start = start;
        self.end = end;
        self
    }

    /// Checks view references and non-empty dataframes before any request.
    pub fn validate(&self) -> Result<(), MortarError> {
        let view_names: HashSet<&str> = self.views.iter().map(|v| v.name.as_str()).collect();
        for df in &self.data_frames {
            if df.timeseries.is_empty() {
                return Err(MortarError::EmptyDataFrame(df.name.clone()));
            }
            for ts in &df.timeseries {
                if !view_names.contains(ts.view.as_str()) {
                    return Err(MortarError::UnknownView {
                        dataframe: df.name.clone(),
                        view: ts.view.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub views: IndexMap<String, ResolvedView>,
    /// Stream metadata of the last timeseries fetched for each dataframe.
    pub metadata: IndexMap<String, DataFrame>,
    pub dataframes: IndexMap<String, DataFrame>,
}

pub struct FetchOrchestrator {
    sparql_gateway: Arc<dyn SparqlGateway>,
    data_fetcher: Arc<dyn DataFetcher>,
    observer: Arc<dyn ClientObserver>,
    max_concurrent_requests: usize,
}

impl FetchOrchestrator {
    pub fn new(
        sparql_gateway: Arc<dyn SparqlGateway>,
        data_fetcher: Arc<dyn DataFetcher>,
        observer: Arc<dyn ClientObserver>,
        max_concurrent_requests: usize,
    ) -> FetchOrchestrator {
        FetchOrchestrator {
            sparql_gateway,
            data_fetcher,
            observer,
            max_concurrent_requests: max_concurrent_requests.max(1),
        }
    }

    pub async fn fetch(&self, spec: &FetchSpec) -> Result<FetchResult, MortarError> {
        spec.validate()?;
        let views = resolve_all(
            self.sparql_gateway.as_ref(),
            &spec.views,
            &spec.sites,
            self.observer.as_ref(),
        )
        .await?;

        let mut metadata = IndexMap::new();
        let mut dataframes = IndexMap::new();
        for df_spec in &spec.data_frames {
            let (df_metadata, data) = self.fetch_data_frame(spec, df_spec, &views).await?;
            metadata.insert(df_spec.name.clone(), df_metadata);
            dataframes.insert(df_spec.name.clone(), data);
        }
        Ok(FetchResult {
            views,
            metadata,
            dataframes,
        })
    }

    async fn fetch_data_frame(
        &self,
        spec: &FetchSpec,
        df_spec: &DataFrameSpec,
        views: &IndexMap<String, ResolvedView>,
    ) -> Result<(DataFrame, DataFrame), MortarError> {
        let mut requests = vec![];
        for ts in &df_spec.timeseries {
            let resolved = views.get(&ts.view).ok_or_else(|| MortarError::UnknownView {
                dataframe: df_spec.name.clone(),
                view: ts.view.clone(),
            })?;
            let query = rewrite(resolved, &ts.view, &ts.data_vars)?;
            debug!("Rewritten query for view {}: {}", ts.view, query);
            requests.push(
                DataRequest::sparql(&query)
                    .with_range(spec.start, spec.end)
                    .with_aggregation(df_spec.aggregation.clone()),
            );
        }

        // `buffered` yields results in request order whatever order they
        // complete in; the first error drops the fetches still in flight.
        let results: Vec<(DataFrame, DataFrame)> = stream::iter(
            requests.iter().map(|request| self.data_fetcher.fetch(request)),
        )
        .buffered(self.max_concurrent_requests)
        .try_collect()
        .await?;

        let mut combined: Option<DataFrame> = None;
        let mut last_metadata = None;
        for (ts, (ts_metadata, data)) in df_spec.timeseries.iter().zip(results) {
            self.observer
                .timeseries_fetched(&df_spec.name, &ts.view, data.height());
            combined = Some(match combined {
                None => data,
                Some(mut combined) => {
                    // Compared in order: vstack matches columns by position.
                    let combined_schema = combined.schema();
                    let data_schema = data.schema();
                    if combined_schema.iter().ne(data_schema.iter()) {
                        return Err(MortarError::SchemaMismatch {
                            dataframe: df_spec.name.clone(),
                            expected: format!("{:?}", combined.schema()),
                            found: format!("{:?}", data.schema()),
                        });
                    }
                    combined
                        .vstack_mut(&data)
                        .map_err(MortarError::DataFrameError)?;
                    combined
                }
            });
            last_metadata = Some(ts_metadata);
        }
        match (last_metadata, combined) {
            (Some(m), Some(d)) => Ok((m, d)),
            _ => Err(MortarError::EmptyDataFrame(df_spec.name.clone())),
        }
    }
}
