use crate::errors::MortarError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const ENDPOINT_ENV: &str = "MORTAR_ENDPOINT";
pub const API_KEY_ENV: &str = "MORTAR_API_KEY";
pub const TIMEOUT_SECS_ENV: &str = "MORTAR_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "MORTAR_MAX_RETRIES";
pub const MAX_CONCURRENT_REQUESTS_ENV: &str = "MORTAR_MAX_CONCURRENT_REQUESTS";
pub const MAX_DECOMPRESSED_BYTES_ENV: &str = "MORTAR_MAX_DECOMPRESSED_BYTES";

/// Matches the server's data read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 40_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    base_url: String,
    api_key: Option<String>,
}

impl EndpointConfig {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<EndpointConfig, MortarError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|x| MortarError::ConfigError(format!("Invalid endpoint {}: {}", base_url, x)))?;
        Ok(EndpointConfig { base_url, api_key })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Retries apply to connection and timeout failures of idempotent reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    pub fn none() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub max_concurrent_requests: usize,
    pub max_decompressed_bytes: u64,
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Result<ClientConfig, MortarError> {
        Ok(ClientConfig {
            endpoint: EndpointConfig::new(endpoint, None)?,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            max_concurrent_requests: 1,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
        })
    }

    pub fn from_env() -> Result<ClientConfig, MortarError> {
        let endpoint = env::var(ENDPOINT_ENV)
            .map_err(|_| MortarError::ConfigError(format!("{} is not set", ENDPOINT_ENV)))?;
        let mut config = ClientConfig::new(&endpoint)?;
        if let Ok(api_key) = env::var(API_KEY_ENV) {
            config = config.with_api_key(api_key);
        }
        if let Some(secs) = parse_env::<u64>(TIMEOUT_SECS_ENV)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max_retries) = parse_env::<usize>(MAX_RETRIES_ENV)? {
            config.retry.max_retries = max_retries;
        }
        if let Some(n) = parse_env::<usize>(MAX_CONCURRENT_REQUESTS_ENV)? {
            config = config.with_max_concurrent_requests(n);
        }
        if let Some(n) = parse_env::<u64>(MAX_DECOMPRESSED_BYTES_ENV)? {
            config.max_decompressed_bytes = n;
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: String) -> ClientConfig {
        self.endpoint.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> ClientConfig {
        self.retry = retry;
        self
    }

    /// Values below one are treated as one (sequential fetching).
    pub fn with_max_concurrent_requests(mut self, n: usize) -> ClientConfig {
        self.max_concurrent_requests = n.max(1);
        self
    }

    pub fn with_max_decompressed_bytes(mut self, n: u64) -> ClientConfig {
        self.max_decompressed_bytes = n;
        self
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, MortarError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MortarError::ConfigError(format!("Could not parse {}={}", key, value))),
        Err(_) => Ok(None),
    }
}
