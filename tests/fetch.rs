use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use hermes_pipeline::domain::SourceId;
use hermes_pipeline::fetch::{
    Fetch, FetchOutcome, FetchRequest, Fetcher, RawReply, RetryPolicy, Sleeper, Throttle,
    Transport,
};

struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<RawReply, String>>>,
    calls: Mutex<u32>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Result<RawReply, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, _request: &FetchRequest, _timeout: Duration) -> Result<RawReply, String> {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

fn reply(status: u16, body: &str) -> Result<RawReply, String> {
    Ok(RawReply {
        status,
        retry_after: None,
        body: body.to_string(),
    })
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        rate_limit_delay: Duration::from_secs(10),
        timeout: Duration::from_secs(1),
    }
}

fn fetcher(
    replies: Vec<Result<RawReply, String>>,
) -> Fetcher<ScriptedTransport, RecordingSleeper> {
    Fetcher::with_sleeper(
        ScriptedTransport::new(replies),
        RecordingSleeper::default(),
        policy(),
        Throttle::default(),
    )
}

fn request() -> FetchRequest {
    FetchRequest::get(SourceId::Usgs, "https://example.test/query")
}

#[test]
fn persistent_network_failure_uses_exactly_the_budget() {
    let fetcher = fetcher(vec![
        Err("connection reset".to_string()),
        Err("connection reset".to_string()),
        Err("connection reset".to_string()),
        reply(200, "{}"),
    ]);

    let outcome = fetcher.fetch(&request());

    assert_matches!(outcome, FetchOutcome::NetworkFailure(reason) if reason == "connection reset");
    assert_eq!(fetcher.transport().calls(), 3);
    assert_eq!(
        fetcher.sleeper().slept(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[test]
fn server_error_then_success_recovers() {
    let fetcher = fetcher(vec![reply(503, ""), reply(200, r#"{"ok":true}"#)]);

    let outcome = fetcher.fetch(&request());

    assert_matches!(outcome, FetchOutcome::Success(body) if body.contains("ok"));
    assert_eq!(fetcher.transport().calls(), 2);
    assert_eq!(fetcher.sleeper().slept(), vec![Duration::from_millis(100)]);
}

#[test]
fn rate_limit_waits_for_the_longer_of_header_and_default() {
    let fetcher = fetcher(vec![
        Ok(RawReply {
            status: 429,
            retry_after: Some(Duration::from_secs(30)),
            body: String::new(),
        }),
        Ok(RawReply {
            status: 429,
            retry_after: Some(Duration::from_secs(1)),
            body: String::new(),
        }),
        reply(200, "{}"),
    ]);

    let outcome = fetcher.fetch(&request());

    assert!(outcome.is_success());
    assert_eq!(
        fetcher.sleeper().slept(),
        vec![Duration::from_secs(30), Duration::from_secs(10)]
    );
}

#[test]
fn rate_limit_past_the_budget_is_terminal() {
    let limited = || {
        Ok(RawReply {
            status: 429,
            retry_after: None,
            body: String::new(),
        })
    };
    let fetcher = fetcher(vec![limited(), limited(), limited()]);

    let outcome = fetcher.fetch(&request());

    assert_matches!(outcome, FetchOutcome::RateLimited { .. });
    assert_eq!(fetcher.transport().calls(), 3);
    assert_eq!(fetcher.sleeper().slept().len(), 2);
}

#[test]
fn not_found_and_rejected_are_not_retried() {
    let not_found = fetcher(vec![reply(404, ""), reply(200, "{}")]);
    assert_matches!(not_found.fetch(&request()), FetchOutcome::NotFound);
    assert_eq!(not_found.transport().calls(), 1);
    assert!(not_found.sleeper().slept().is_empty());

    let forbidden = fetcher(vec![reply(403, ""), reply(200, "{}")]);
    assert_matches!(forbidden.fetch(&request()), FetchOutcome::Rejected(403));
    assert_eq!(forbidden.transport().calls(), 1);

    let unauthorized = fetcher(vec![reply(401, "")]);
    assert_matches!(unauthorized.fetch(&request()), FetchOutcome::Rejected(401));
}

#[test]
fn throttle_spaces_consecutive_calls_to_one_provider() {
    let throttle = Throttle::new(HashMap::from([(SourceId::Nominatim, Duration::from_secs(60))]));
    let fetcher = Fetcher::with_sleeper(
        ScriptedTransport::new(vec![reply(200, "[]"), reply(200, "[]"), reply(200, "{}")]),
        RecordingSleeper::default(),
        policy(),
        throttle,
    );

    let nominatim = FetchRequest::get(SourceId::Nominatim, "https://example.test/search");
    assert!(fetcher.fetch(&nominatim).is_success());
    assert!(fetcher.sleeper().slept().is_empty());

    assert!(fetcher.fetch(&nominatim).is_success());
    let slept = fetcher.sleeper().slept();
    assert_eq!(slept.len(), 1);
    assert!(slept[0] > Duration::from_secs(59));

    // Other providers are not held back.
    assert!(fetcher.fetch(&request()).is_success());
    assert_eq!(fetcher.sleeper().slept().len(), 1);
}
