use crate::errors::MortarError;
use crate::observer::ClientObserver;
use indexmap::IndexMap;
use polars::prelude::DataFrame;
use sparql_gateway::SparqlGateway;

/// A named, reusable SPARQL query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub name: String,
    pub definition: String,
}

impl ViewDefinition {
    pub fn new(name: &str, definition: &str) -> ViewDefinition {
        ViewDefinition {
            name: name.to_string(),
            definition: definition.to_string(),
        }
    }
}

/// A view evaluated for one fetch. Never reused across fetches.
#[derive(Debug, Clone)]
pub struct ResolvedView {
    pub definition: String,
    pub columns: Vec<String>,
    pub results: DataFrame,
}

pub async fn resolve(
    gateway: &dyn SparqlGateway,
    view: &ViewDefinition,
    sites: &[String],
) -> Result<ResolvedView, MortarError> {
    let results = gateway.query(&view.definition, Some(sites)).await?;
    let columns = results
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    Ok(ResolvedView {
        definition: view.definition.clone(),
        columns,
        results,
    })
}

/// Resolves every view once, in declaration order.
pub async fn resolve_all(
    gateway: &dyn SparqlGateway,
    views: &[ViewDefinition],
    sites: &[String],
    observer: &dyn ClientObserver,
) -> Result<IndexMap<String, ResolvedView>, MortarError> {
    let mut resolved = IndexMap::new();
    for view in views {
        let r = resolve(gateway, view, sites).await?;
        observer.views_resolved(&view.name, &r.columns, r.results.height());
        resolved.insert(view.name.clone(), r);
    }
    Ok(resolved)
}
