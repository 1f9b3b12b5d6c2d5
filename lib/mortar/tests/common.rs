#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use log::debug;
use lz4_flex::frame::FrameEncoder;
use mortar::data::{DataFetcher, DataRequest, DataSelector};
use mortar::errors::MortarError;
use mortar::observer::ClientObserver;
use polars::df;
use polars::prelude::{DataFrame, IpcStreamWriter, NamedFrom, SerWriter, Series};
use sparql_gateway::{SparqlGateway, SparqlQueryError};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logger() {
    let res = env_logger::try_init();
    match res {
        Ok(_) => {}
        Err(_) => {
            debug!("Tried to initialize logger which is already initialize")
        }
    }
}

pub fn ipc_stream(df: &DataFrame) -> Vec<u8> {
    let mut df = df.clone();
    let mut buf = vec![];
    IpcStreamWriter::new(&mut buf).finish(&mut df).unwrap();
    buf
}

pub fn lz4(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = FrameEncoder::new(vec![]);
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// A `/query` response body: metadata stream then data stream, compressed.
pub fn encode_response(metadata: &DataFrame, data: &DataFrame) -> Vec<u8> {
    let mut bytes = ipc_stream(metadata);
    bytes.extend(ipc_stream(data));
    lz4(&bytes)
}

pub fn stream_metadata(uri: &str) -> DataFrame {
    df!(
        "brick_class" => &["https://brickschema.org/schema/Brick#Air_Temperature_Sensor"],
        "brick_uri" => &[uri],
        "units" => &["degF"],
        "name" => &[uri],
        "stream_id" => &[1i64]
    )
    .unwrap()
}

pub fn readings(uri: &str, times: &[i64], values: &[f64]) -> DataFrame {
    let ids: Vec<&str> = times.iter().map(|_| uri).collect();
    df!(
        "time" => times,
        "value" => values,
        "id" => ids
    )
    .unwrap()
}

pub fn strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    df.column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

/// Answers every query with a table of the given columns, one row per site.
pub struct FakeGateway {
    pub columns: Vec<String>,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeGateway {
    pub fn new(columns: &[&str]) -> FakeGateway {
        FakeGateway {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            calls: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl SparqlGateway for FakeGateway {
    async fn execute(&self, query: &str, site: Option<&str>) -> Result<DataFrame, SparqlQueryError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), site.map(|s| s.to_string())));
        let name = site.unwrap_or("all");
        let series = self
            .columns
            .iter()
            .map(|c| Series::new(c, vec![format!("{}-{}", name, c)]))
            .collect();
        Ok(DataFrame::new(series)?)
    }
}

pub enum FakeResponse {
    Tables {
        metadata: DataFrame,
        data: DataFrame,
        delay: Duration,
    },
    Fail(u16, String),
}

/// Answers each request with the first scripted response whose needle occurs
/// in the request's query (or joined URIs), and records every request.
pub struct FakeFetcher {
    pub responses: Mutex<Vec<(String, FakeResponse)>>,
    pub requests: Mutex<Vec<DataRequest>>,
}

fn selector_text(request: &DataRequest) -> String {
    match &request.selector {
        DataSelector::Sparql { query, .. } => query.clone(),
        DataSelector::Uris(uris) => uris.join(","),
    }
}

impl FakeFetcher {
    pub fn new(responses: Vec<(&str, FakeResponse)>) -> FakeFetcher {
        FakeFetcher {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(needle, r)| (needle.to_string(), r))
                    .collect(),
            ),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(selector_text)
            .collect()
    }
}

#[async_trait]
impl DataFetcher for FakeFetcher {
    async fn fetch(&self, request: &DataRequest) -> Result<(DataFrame, DataFrame), MortarError> {
        let text = selector_text(request);
        let response = {
            self.requests.lock().unwrap().push(request.clone());
            let mut responses = self.responses.lock().unwrap();
            let i = responses
                .iter()
                .position(|(needle, _)| text.contains(needle.as_str()))
                .unwrap_or_else(|| panic!("No scripted response for {}", text));
            responses.remove(i).1
        };
        match response {
            FakeResponse::Tables {
                metadata,
                data,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                Ok((metadata, data))
            }
            FakeResponse::Fail(status, body) => Err(MortarError::DataRequestError { status, body }),
        }
    }
}

pub fn tables(metadata: DataFrame, data: DataFrame) -> FakeResponse {
    delayed(metadata, data, 0)
}

pub fn delayed(metadata: DataFrame, data: DataFrame, millis: u64) -> FakeResponse {
    FakeResponse::Tables {
        metadata,
        data,
        delay: Duration::from_millis(millis),
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl ClientObserver for RecordingObserver {
    fn request(&self, operation: &str, _url: &str) {
        self.events.lock().unwrap().push(format!("request {}", operation));
    }

    fn failure(&self, operation: &str, _message: &str) {
        self.events.lock().unwrap().push(format!("failure {}", operation));
    }
}

pub type Params = Vec<(String, String)>;

#[derive(Clone, Default)]
pub struct MockMortar {
    pub sparql_requests: Arc<Mutex<Vec<Params>>>,
    pub query_requests: Arc<Mutex<Vec<Params>>>,
    pub qualify_requests: Arc<Mutex<Vec<(Params, Vec<String>)>>>,
    pub model_requests: Arc<Mutex<Vec<(Params, serde_json::Value)>>>,
    pub qualify_response: Arc<Mutex<String>>,
    pub query_response: Arc<Mutex<Option<Vec<u8>>>>,
}

pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn params_named<'a>(params: &'a Params, key: &str) -> Vec<&'a str> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

const SPARQL_RESULTS: &str = r#"{
  "head": {"vars": ["sensor", "equip"]},
  "results": {"bindings": [
    {"sensor": {"type": "uri", "value": "urn:bldg#tmp1"},
     "equip": {"type": "uri", "value": "urn:bldg#vav1"}}
  ]}
}"#;

async fn sparql(State(mock): State<MockMortar>, Query(params): Query<Params>) -> Response {
    mock.sparql_requests.lock().unwrap().push(params);
    (
        [(header::CONTENT_TYPE, "application/sparql-results+json")],
        SPARQL_RESULTS,
    )
        .into_response()
}

async fn query(State(mock): State<MockMortar>, Query(params): Query<Params>) -> Response {
    mock.query_requests.lock().unwrap().push(params);
    match mock.query_response.lock().unwrap().clone() {
        Some(body) => body.into_response(),
        None => (StatusCode::BAD_REQUEST, "Could not read source from params").into_response(),
    }
}

async fn qualify(
    State(mock): State<MockMortar>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    let queries: Vec<String> = serde_json::from_slice(&body).unwrap();
    mock.qualify_requests.lock().unwrap().push((params, queries));
    let response = mock.qualify_response.lock().unwrap().clone();
    ([(header::CONTENT_TYPE, "application/json")], response).into_response()
}

async fn model(
    State(mock): State<MockMortar>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    let request: serde_json::Value = serde_json::from_slice(&body).unwrap();
    mock.model_requests.lock().unwrap().push((params, request));
    "@prefix brick: <https://brickschema.org/schema/Brick#> .".into_response()
}

impl MockMortar {
    /// Serves the mock on an ephemeral port and returns its base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/sparql", get(sparql))
            .route("/query", get(query))
            .route("/qualify", post(qualify))
            .route("/query/model", post(model))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    pub fn set_qualify_response(&self, response: &str) {
        *self.qualify_response.lock().unwrap() = response.to_string();
    }

    pub fn set_query_response(&self, body: Vec<u8>) {
        *self.query_response.lock().unwrap() = Some(body);
    }
}

pub fn mock_with_data() -> (MockMortar, HashMap<&'static str, DataFrame>) {
    let mock = MockMortar::default();
    let metadata = stream_metadata("urn:bldg#tmp1");
    let data = readings("urn:bldg#tmp1", &[1, 2], &[70.5, 71.0]);
    mock.set_query_response(encode_response(&metadata, &data));
    let mut frames = HashMap::new();
    frames.insert("metadata", metadata);
    frames.insert("data", data);
    (mock, frames)
}
