pub mod client;
pub mod config;
pub mod data;
pub mod errors;
pub mod fetch;
pub mod observer;
pub mod qualify;
mod retry;
pub mod rewrite;
pub mod stream;
pub mod views;
pub mod wire;

pub use client::Client;
pub use config::{ClientConfig, EndpointConfig, RetryPolicy};
pub use data::{Aggregation, AggregationWindow, DataRequest, Dataset};
pub use errors::MortarError;
pub use fetch::{DataFrameSpec, FetchResult, FetchSpec, TimeseriesSpec};
pub use qualify::{QualifyQueries, QualifyResult};
pub use stream::{Stream, StreamDefinition};
pub use views::{ResolvedView, ViewDefinition};
