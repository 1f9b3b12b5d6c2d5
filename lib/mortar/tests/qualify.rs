mod common;

use async_trait::async_trait;
use common::*;
use indexmap::IndexMap;
use mortar::config::{EndpointConfig, RetryPolicy};
use mortar::errors::MortarError;
use mortar::observer::NoopObserver;
use mortar::qualify::{
    qualify, HttpQualifyEngine, QualifyEngine, QualifyQueries, QualifyResponse,
};
use rstest::*;
use std::sync::{Arc, Mutex};

const HAS_TEMP: &str = "SELECT ?s WHERE { ?s a brick:Air_Temperature_Sensor }";
const HAS_VAV: &str = "SELECT ?v WHERE { ?v a brick:VAV }";

#[fixture]
fn use_logger() {
    init_logger();
}

struct ScriptedEngine {
    response: String,
    batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedEngine {
    fn new(response: &str) -> ScriptedEngine {
        ScriptedEngine {
            response: response.to_string(),
            batches: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl QualifyEngine for ScriptedEngine {
    async fn qualify_batch(&self, queries: &[String]) -> Result<QualifyResponse, MortarError> {
        self.batches.lock().unwrap().push(queries.to_vec());
        QualifyResponse::from_slice(self.response.as_bytes())
    }
}

#[rstest]
#[tokio::test]
async fn test_sites_satisfying_every_query(use_logger: ()) {
    use_logger;
    let engine = ScriptedEngine::new(r#"{"A": [true, true], "B": [true, false]}"#);
    let result = qualify(&engine, vec![HAS_TEMP, HAS_VAV].into())
        .await
        .unwrap();
    assert_eq!(result.sites(), vec!["A"]);
    assert_eq!(result.columns(), &["Query_0".to_string(), "Query_1".to_string()]);
    assert_eq!(
        *engine.batches.lock().unwrap(),
        vec![vec![HAS_TEMP.to_string(), HAS_VAV.to_string()]]
    );
}

#[rstest]
#[tokio::test]
async fn test_named_queries_label_columns() {
    let engine = ScriptedEngine::new(r#"{"B": [false, true], "A": [true, true]}"#);
    let queries: QualifyQueries = vec![("q1", HAS_TEMP), ("q2", HAS_VAV)].into();
    let result = qualify(&engine, queries).await.unwrap();
    assert_eq!(result.columns(), &["q1".to_string(), "q2".to_string()]);
    assert_eq!(result.sites(), vec!["A"]);

    let df = result.to_dataframe().unwrap();
    assert_eq!(column_names(&df), vec!["site", "q1", "q2"]);
    assert_eq!(
        strings(&df, "site"),
        vec![Some("B".to_string()), Some("A".to_string())]
    );
    let q1: Vec<Option<bool>> = df.column("q1").unwrap().bool().unwrap().into_iter().collect();
    assert_eq!(q1, vec![Some(false), Some(true)]);
}

#[rstest]
#[tokio::test]
async fn test_index_map_keeps_declaration_order() {
    let engine = ScriptedEngine::new(r#"{"A": [true, false]}"#);
    let mut queries = IndexMap::new();
    queries.insert("vav".to_string(), HAS_VAV.to_string());
    queries.insert("temp".to_string(), HAS_TEMP.to_string());
    let result = qualify(&engine, queries.into()).await.unwrap();
    assert_eq!(result.columns(), &["vav".to_string(), "temp".to_string()]);
    assert!(result.sites().is_empty());
    assert_eq!(
        *engine.batches.lock().unwrap(),
        vec![vec![HAS_VAV.to_string(), HAS_TEMP.to_string()]]
    );
}

#[rstest]
#[tokio::test]
async fn test_empty_response_is_an_error() {
    let engine = ScriptedEngine::new("{}");
    let res = qualify(&engine, vec![HAS_TEMP].into()).await;
    assert!(matches!(res, Err(MortarError::EmptyQualifyResult)));
}

#[rstest]
#[tokio::test]
async fn test_no_queries_and_no_sites_is_empty_result() {
    let engine = ScriptedEngine::new("{}");
    let res = qualify(&engine, Vec::<String>::new().into()).await;
    assert!(matches!(res, Err(MortarError::EmptyQualifyResult)));
    assert_eq!(*engine.batches.lock().unwrap(), vec![Vec::<String>::new()]);
}

#[rstest]
#[tokio::test]
async fn test_wrong_number_of_booleans_is_malformed() {
    let engine = ScriptedEngine::new(r#"{"A": [true]}"#);
    let res = qualify(&engine, vec![HAS_TEMP, HAS_VAV].into()).await;
    assert!(matches!(res, Err(MortarError::MalformedQualifyResponse(_))));
}

#[rstest]
#[tokio::test]
async fn test_non_json_response_is_malformed() {
    let engine = ScriptedEngine::new("Internal error");
    let res = qualify(&engine, vec![HAS_TEMP].into()).await;
    assert!(matches!(res, Err(MortarError::MalformedQualifyResponse(_))));
}

#[rstest]
#[tokio::test]
async fn test_http_engine_posts_queries_in_order(use_logger: ()) {
    use_logger;
    let mock = MockMortar::default();
    mock.set_qualify_response(r#"{"ciee": [true, true], "soda": [false, true]}"#);
    let base_url = mock.serve().await;
    let endpoint = EndpointConfig::new(&base_url, Some("secret".to_string())).unwrap();
    let engine = HttpQualifyEngine::new(
        reqwest::Client::new(),
        endpoint,
        RetryPolicy::none(),
        Arc::new(NoopObserver),
    );
    let result = qualify(&engine, vec![HAS_TEMP, HAS_VAV].into())
        .await
        .unwrap();
    assert_eq!(result.sites(), vec!["ciee"]);

    let requests = mock.qualify_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (params, queries) = &requests[0];
    assert_eq!(param(params, "apikey"), Some("secret"));
    assert_eq!(queries, &vec![HAS_TEMP.to_string(), HAS_VAV.to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_http_engine_without_api_key_sends_none() {
    let mock = MockMortar::default();
    mock.set_qualify_response(r#"{"ciee": [true]}"#);
    let base_url = mock.serve().await;
    let endpoint = EndpointConfig::new(&base_url, None).unwrap();
    let engine = HttpQualifyEngine::new(
        reqwest::Client::new(),
        endpoint,
        RetryPolicy::none(),
        Arc::new(NoopObserver),
    );
    qualify(&engine, vec![HAS_TEMP].into()).await.unwrap();
    let requests = mock.qualify_requests.lock().unwrap().clone();
    assert_eq!(param(&requests[0].0, "apikey"), None);
}
