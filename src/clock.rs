use std::convert::Infallible;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::config::Config;

/// Header carrying a spoofed "now" as epoch milliseconds. Only honored in
/// test mode.
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

/// Source of the current instant used for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The instant a request should be evaluated at.
#[derive(Debug, Clone, Copy)]
pub struct RequestNow(pub DateTime<Utc>);

impl RequestNow {
    /// Resolve "now" for a request: the test header when test mode is on and
    /// the header parses, the given clock otherwise.
    pub fn resolve(headers: &HeaderMap, test_mode: bool, clock: &impl Clock) -> Self {
        if test_mode {
            if let Some(now) = headers
                .get(TEST_NOW_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            {
                debug!("using test clock override: {now}");
                return RequestNow(now);
            }
        }
        RequestNow(clock.now())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestNow
where
    Config: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        Ok(RequestNow::resolve(&parts.headers, config.test_mode, &SystemClock))
    }
}
