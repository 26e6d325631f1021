use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use tracing::{debug, warn};

use crate::domain::SourceId;
use crate::error::HermesError;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub source: SourceId,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(source: SourceId, endpoint: impl Into<String>) -> Self {
        Self {
            source,
            endpoint: endpoint.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    RateLimited { retry_after: Option<Duration> },
    NotFound,
    ServerError(u16),
    Rejected(u16),
    NetworkFailure(String),
}

impl FetchOutcome {
    pub fn classify(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            200..=299 => FetchOutcome::Success(body),
            404 => FetchOutcome::NotFound,
            429 => FetchOutcome::RateLimited { retry_after },
            500..=599 => FetchOutcome::ServerError(status),
            other => FetchOutcome::Rejected(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn into_json(self) -> Result<serde_json::Value, String> {
        match self {
            FetchOutcome::Success(body) => {
                serde_json::from_str(&body).map_err(|err| format!("malformed JSON: {err}"))
            }
            other => Err(other.to_string()),
        }
    }

    pub fn into_body(self) -> Result<String, String> {
        match self {
            FetchOutcome::Success(body) => Ok(body),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success(body) => write!(f, "success ({} bytes)", body.len()),
            FetchOutcome::RateLimited {
                retry_after: Some(delay),
            } => write!(f, "rate limited (retry after {}s)", delay.as_secs()),
            FetchOutcome::RateLimited { retry_after: None } => write!(f, "rate limited"),
            FetchOutcome::NotFound => write!(f, "not found"),
            FetchOutcome::ServerError(status) => write!(f, "server error {status}"),
            FetchOutcome::Rejected(status) => write!(f, "rejected with status {status}"),
            FetchOutcome::NetworkFailure(reason) => write!(f, "network failure: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

pub trait Transport: Send + Sync {
    /// `Err` is reserved for failures below HTTP, such as a refused connection or a timeout.
    fn send(&self, request: &FetchRequest, timeout: Duration) -> Result<RawReply, String>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, HermesError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hermes-pipeline/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HermesError::HttpClient(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| HermesError::HttpClient(err.to_string()))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &FetchRequest, timeout: Duration) -> Result<RawReply, String> {
        let response = self
            .client
            .get(&request.endpoint)
            .query(&request.params)
            .timeout(timeout)
            .send()
            .map_err(|err| err.to_string())?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().map_err(|err| err.to_string())?;

        Ok(RawReply {
            status,
            retry_after,
            body,
        })
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport calls per request, first attempt included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Default)]
pub struct Throttle {
    intervals: HashMap<SourceId, Duration>,
    last_call: Mutex<HashMap<SourceId, Instant>>,
}

impl Throttle {
    pub fn new(intervals: HashMap<SourceId, Duration>) -> Self {
        Self {
            intervals,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self, source: SourceId) -> Duration {
        self.intervals.get(&source).copied().unwrap_or_default()
    }

    pub fn wait_turn(&self, source: SourceId, sleeper: &dyn Sleeper) {
        let interval = self.interval(source);
        if interval.is_zero() {
            return;
        }
        let mut last_call = match self.last_call.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = last_call.get(&source) {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                debug!(source = %source, wait_ms = wait.as_millis() as u64, "throttling");
                sleeper.sleep(wait);
            }
        }
        last_call.insert(source, Instant::now());
    }
}

pub trait Fetch {
    fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

pub struct Fetcher<T: Transport, S: Sleeper = ThreadSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    throttle: Throttle,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy, throttle: Throttle) -> Self {
        Self::with_sleeper(transport, ThreadSleeper, policy, throttle)
    }
}

impl<T: Transport, S: Sleeper> Fetcher<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S, policy: RetryPolicy, throttle: Throttle) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            throttle,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn attempt(&self, request: &FetchRequest, timeout: Duration) -> FetchOutcome {
        self.throttle.wait_turn(request.source, &self.sleeper);
        match self.transport.send(request, timeout) {
            Ok(reply) => FetchOutcome::classify(reply.status, reply.retry_after, reply.body),
            Err(reason) => FetchOutcome::NetworkFailure(reason),
        }
    }
}

impl<T: Transport, S: Sleeper> Fetch for Fetcher<T, S> {
    fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = request.timeout.unwrap_or(self.policy.timeout);
        let mut attempt = 1u32;
        loop {
            let outcome = self.attempt(request, timeout);
            debug!(
                source = %request.source,
                endpoint = %request.endpoint,
                attempt,
                max_attempts,
                outcome = %outcome,
                "fetch attempt"
            );

            let delay = match &outcome {
                FetchOutcome::ServerError(_) | FetchOutcome::NetworkFailure(_) => {
                    self.policy.base_delay * attempt
                }
                FetchOutcome::RateLimited { retry_after } => retry_after
                    .unwrap_or_default()
                    .max(self.policy.rate_limit_delay),
                FetchOutcome::Success(_) | FetchOutcome::NotFound | FetchOutcome::Rejected(_) => {
                    return outcome;
                }
            };

            if attempt >= max_attempts {
                warn!(
                    source = %request.source,
                    endpoint = %request.endpoint,
                    attempts = attempt,
                    outcome = %outcome,
                    "retry budget exhausted"
                );
                return outcome;
            }

            warn!(
                source = %request.source,
                attempt,
                delay_ms = delay.as_millis() as u64,
                outcome = %outcome,
                "retrying after transient failure"
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn classify_maps_status_families() {
        assert_matches!(FetchOutcome::classify(200, None, "{}".into()), FetchOutcome::Success(_));
        assert_matches!(FetchOutcome::classify(404, None, String::new()), FetchOutcome::NotFound);
        assert_matches!(
            FetchOutcome::classify(429, Some(Duration::from_secs(3)), String::new()),
            FetchOutcome::RateLimited { retry_after: Some(_) }
        );
        assert_matches!(
            FetchOutcome::classify(503, None, String::new()),
            FetchOutcome::ServerError(503)
        );
        assert_matches!(FetchOutcome::classify(401, None, String::new()), FetchOutcome::Rejected(401));
        assert_matches!(FetchOutcome::classify(403, None, String::new()), FetchOutcome::Rejected(403));
    }

    #[test]
    fn into_json_reports_non_success_outcome() {
        let err = FetchOutcome::ServerError(502).into_json().unwrap_err();
        assert_eq!(err, "server error 502");
        let err = FetchOutcome::Success("not json".into()).into_json().unwrap_err();
        assert!(err.starts_with("malformed JSON"));
    }

    #[test]
    fn request_builder_collects_params() {
        let request = FetchRequest::get(SourceId::Usgs, "https://example.test/query")
            .param("format", "geojson")
            .param("minmagnitude", "4.5")
            .timeout(Duration::from_secs(5));
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    struct CountingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn throttle_spaces_calls_for_the_same_provider_only() {
        let mut intervals = HashMap::new();
        intervals.insert(SourceId::Nominatim, Duration::from_secs(1));
        let throttle = Throttle::new(intervals);
        let sleeper = CountingSleeper(Mutex::new(Vec::new()));

        throttle.wait_turn(SourceId::Nominatim, &sleeper);
        throttle.wait_turn(SourceId::Usgs, &sleeper);
        assert!(sleeper.0.lock().unwrap().is_empty());

        throttle.wait_turn(SourceId::Nominatim, &sleeper);
        let waits = sleeper.0.lock().unwrap();
        assert_eq!(waits.len(), 1);
        assert!(waits[0] <= Duration::from_secs(1));
        assert!(waits[0] > Duration::ZERO);
    }
}
