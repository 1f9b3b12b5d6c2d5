use crate::client::Client;
use crate::data::{AggregationWindow, Dataset};
use crate::errors::MortarError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Identity of a registered stream, in the service's field naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    #[serde(rename = "SourceName")]
    pub source: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Units")]
    pub units: String,
    #[serde(rename = "BrickURI", skip_serializing_if = "Option::is_none", default)]
    pub uri: Option<String>,
    #[serde(rename = "BrickClass", skip_serializing_if = "Option::is_none", default)]
    pub brick_class: Option<String>,
}

/// A stream handle. The client reference is weak: it only dispatches reads
/// and does not keep the client alive.
#[derive(Debug, Clone)]
pub struct Stream {
    client: Weak<Client>,
    definition: StreamDefinition,
}

impl Stream {
    pub(crate) fn new(client: Weak<Client>, definition: StreamDefinition) -> Stream {
        Stream { client, definition }
    }

    pub fn source(&self) -> &str {
        &self.definition.source
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn units(&self) -> &str {
        &self.definition.units
    }

    pub fn uri(&self) -> Option<&str> {
        self.definition.uri.as_deref()
    }

    pub fn brick_class(&self) -> Option<&str> {
        self.definition.brick_class.as_deref()
    }

    pub async fn get_data(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        aggregation: Option<AggregationWindow>,
    ) -> Result<Dataset, MortarError> {
        let uri = self
            .definition
            .uri
            .clone()
            .ok_or_else(|| MortarError::MissingStreamUri(self.definition.name.clone()))?;
        let client = self.client.upgrade().ok_or(MortarError::ClientDropped)?;
        client.data_uris(&[uri], start, end, aggregation).await
    }
}
