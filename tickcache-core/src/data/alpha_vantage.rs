//! Alpha Vantage intraday client.
//!
//! Fetches `TIME_SERIES_INTRADAY` for one symbol per call. Handles the
//! upstream's in-band rate-limit and error messages, retries transient
//! failures with exponential backoff, and maps everything else onto the
//! [`ApiError`] taxonomy.
//!
//! Alpha Vantage answers most failures with HTTP 200 and a message field, so
//! the body has to be inspected even on success statuses.

use super::provider::{Connectivity, IntradaySeries, IntradaySource};
use super::retry::{Attempt, RetryCause, RetryPolicy};
use crate::config::ServiceConfig;
use crate::domain::{Interval, OutputSize};
use crate::error::ApiError;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Per-attempt network timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FUNCTION: &str = "TIME_SERIES_INTRADAY";

/// Alpha Vantage data source.
pub struct AlphaVantageClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl AlphaVantageClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        Self::with_timeout(api_key, base_url, retry, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tickcache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(
            config.api_key.clone(),
            config.base_url.clone(),
            config.retry_policy(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn query<'a>(
        &'a self,
        symbol: &'a str,
        interval: Interval,
        output_size: OutputSize,
    ) -> [(&'static str, &'a str); 5] {
        [
            ("function", FUNCTION),
            ("symbol", symbol),
            ("interval", interval.as_str()),
            ("outputsize", output_size.as_str()),
            ("apikey", self.api_key.as_str()),
        ]
    }

    /// Execute exactly one HTTP request and classify the result.
    fn attempt(
        &self,
        symbol: &str,
        interval: Interval,
        output_size: OutputSize,
    ) -> Attempt<IntradaySeries> {
        tracing::debug!(
            symbol,
            function = FUNCTION,
            interval = %interval,
            outputsize = %output_size,
            apikey = "***",
            "requesting intraday series"
        );

        let resp = match self
            .client
            .get(&self.base_url)
            .query(&self.query(symbol, interval, output_size))
            .send()
        {
            Ok(resp) => resp,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status().as_u16();
        match resp.text() {
            Ok(body) => classify_response(status, &body, interval),
            Err(e) => classify_transport_error(&e),
        }
    }
}

impl IntradaySource for AlphaVantageClient {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        output_size: OutputSize,
    ) -> Result<IntradaySeries, ApiError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ApiError::data_retrieval("symbol must not be empty"));
        }

        self.retry.run(
            symbol,
            |_| self.attempt(symbol, interval, output_size),
            std::thread::sleep,
        )
    }

    fn probe(&self, symbol: &str) -> Connectivity {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Connectivity {
                reachable: false,
                message: "no symbol to probe with".into(),
            };
        }

        let attempt = self.attempt(symbol, Interval::default(), OutputSize::Compact);
        let (reachable, message) = match attempt {
            Attempt::Success(series) => (
                true,
                format!("upstream reachable: {} points for {symbol}", series.len()),
            ),
            Attempt::Retry(RetryCause::RateLimited(msg)) => {
                (false, format!("upstream reachable but rate limited: {msg}"))
            }
            Attempt::Retry(RetryCause::Transient(msg)) => {
                (false, format!("upstream unreachable: {msg}"))
            }
            Attempt::Fail(err) => (false, err.to_string()),
        };

        tracing::info!(symbol, reachable, "connectivity probe: {message}");
        Connectivity { reachable, message }
    }
}

/// Map a transport-level failure. All of them are worth another attempt.
fn classify_transport_error(e: &reqwest::Error) -> Attempt<IntradaySeries> {
    let what = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Attempt::Retry(RetryCause::Transient(format!("{what}: {e}")))
}

fn is_rate_limit_message(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("api call frequency") || m.contains("rate limit")
}

fn is_invalid_key_message(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    (m.contains("apikey") || m.contains("api key"))
        && (m.contains("invalid") || m.contains("missing"))
}

/// Classify one HTTP response from the intraday endpoint.
pub fn classify_response(status: u16, body: &str, interval: Interval) -> Attempt<IntradaySeries> {
    match status {
        401 | 403 => {
            return Attempt::Fail(
                ApiError::authentication(format!("upstream rejected credentials (HTTP {status})"))
                    .with_detail("status", status),
            )
        }
        500..=599 => return Attempt::Retry(RetryCause::Transient(format!("HTTP {status}"))),
        200..=299 => {}
        _ => {
            return Attempt::Fail(
                ApiError::data_retrieval(format!("upstream refused request (HTTP {status})"))
                    .with_detail("status", status),
            )
        }
    }

    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return Attempt::Fail(ApiError::data_retrieval(format!(
                "unparsable response: {e}"
            )))
        }
    };
    let Some(obj) = json.as_object() else {
        return Attempt::Fail(ApiError::data_retrieval("response is not a JSON object"));
    };

    if let Some(msg) = obj.get("Error Message").and_then(Value::as_str) {
        if is_invalid_key_message(msg) {
            return Attempt::Fail(ApiError::authentication(msg));
        }
        return Attempt::Fail(ApiError::data_retrieval(msg).with_detail("upstream_error", msg));
    }

    for field in ["Note", "Information"] {
        if let Some(msg) = obj.get(field).and_then(Value::as_str) {
            if is_rate_limit_message(msg) {
                return Attempt::Retry(RetryCause::RateLimited(msg.to_string()));
            }
            if is_invalid_key_message(msg) {
                return Attempt::Fail(ApiError::authentication(msg));
            }
        }
    }

    let key = interval.series_key();
    let Some(series) = obj.get(&key) else {
        let mut err = ApiError::data_retrieval(format!("'{key}' missing in response"));
        if let Some(info) = obj.get("Information").and_then(Value::as_str) {
            err = err.with_detail("upstream_info", info);
        }
        return Attempt::Fail(err);
    };

    match serde_json::from_value::<IntradaySeries>(series.clone()) {
        Ok(points) if points.is_empty() => {
            Attempt::Fail(ApiError::data_retrieval(format!("'{key}' is empty")))
        }
        Ok(points) => Attempt::Success(points),
        Err(e) => Attempt::Fail(ApiError::data_retrieval(format!("malformed '{key}': {e}"))),
    }
}
