// HTTP health check implementation

use crate::{HealthCheckData, HealthCheckError, HealthCheckResult};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Client timeout used by [`health_check_ok`].
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP health check configuration
#[derive(Debug, Clone)]
pub struct HttpHealthCheckConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub expected_status: Vec<u16>,
}

impl Default for HttpHealthCheckConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: DEFAULT_HEALTH_TIMEOUT,
            expected_status: vec![200],
        }
    }
}

impl HttpHealthCheckConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_status(mut self, status_codes: Vec<u16>) -> Self {
        self.expected_status = status_codes;
        self
    }
}

/// True only when `url` answers 200 within five seconds.
pub async fn health_check_ok(url: &str) -> bool {
    match check_http_health(url, DEFAULT_HEALTH_TIMEOUT).await {
        Ok(data) => data.is_healthy,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

/// Perform HTTP health check
pub async fn check_http_health(endpoint: &str, check_timeout: Duration) -> HealthCheckResult<HealthCheckData> {
    let config = HttpHealthCheckConfig::new(endpoint).with_timeout(check_timeout);
    check_http_health_with_config(&config).await
}

/// Perform HTTP health check with custom configuration
pub async fn check_http_health_with_config(config: &HttpHealthCheckConfig) -> HealthCheckResult<HealthCheckData> {
    let url = reqwest::Url::parse(&config.endpoint).map_err(|e| HealthCheckError::InvalidEndpoint {
        id: config.endpoint.clone(),
        reason: e.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("processmonitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| HealthCheckError::ClientUnavailable { reason: e.to_string() })?;

    debug!("Starting HTTP health check: {}", config.endpoint);
    let start_time = Instant::now();
    let response = client.get(url).send().await;
    let elapsed = start_time.elapsed().as_millis() as u64;

    let response = match response {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() => {
            debug!("HTTP health check timeout: {}", config.endpoint);
            return Ok(HealthCheckData::unhealthy(None, elapsed, "Timeout"));
        }
        Err(e) => {
            debug!("HTTP health check connection failed: {} - {}", config.endpoint, e);
            return Ok(HealthCheckData::unhealthy(None, elapsed, format!("Connection failed: {}", e)));
        }
    };

    let status = response.status().as_u16();
    let is_healthy = config.expected_status.contains(&status);

    debug!(
        "HTTP health check complete: {} - status={} healthy={} time={}ms",
        config.endpoint, status, is_healthy, elapsed
    );

    Ok(if is_healthy {
        HealthCheckData::healthy(status, elapsed)
    } else {
        HealthCheckData::unhealthy(Some(status), elapsed, format!("Unexpected status code: {}", status))
    })
}
