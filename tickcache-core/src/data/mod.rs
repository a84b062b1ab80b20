//! Upstream data access: source trait, Alpha Vantage client, retry driver.

pub mod alpha_vantage;
pub mod provider;
pub mod retry;

pub use alpha_vantage::{classify_response, AlphaVantageClient, DEFAULT_BASE_URL};
pub use provider::{Connectivity, IntradaySeries, IntradaySource, RawOhlcv};
pub use retry::{Attempt, RetryCause, RetryPolicy};
