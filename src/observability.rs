use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("smartasset.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("smartasset.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("smartasset.client.request_duration_seconds");
pub(crate) static CLIENT_TOKEN_REFRESHES: Counter =
    Counter::new("smartasset.client.token_refreshes");
pub(crate) static CLIENT_TOKEN_REFRESH_FAILURES: Counter =
    Counter::new("smartasset.client.token_refresh_failures");

pub(crate) static STREAM_DELTAS: Counter = Counter::new("smartasset.stream.deltas");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("smartasset.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("smartasset.stream.bytes");

pub(crate) static THREAD_SENDS_STARTED: Counter = Counter::new("smartasset.thread.sends_started");
pub(crate) static THREAD_SENDS_SETTLED: Counter = Counter::new("smartasset.thread.sends_settled");
pub(crate) static THREAD_SENDS_FAILED: Counter = Counter::new("smartasset.thread.sends_failed");
pub(crate) static THREAD_STALE_DISCARDS: Counter =
    Counter::new("smartasset.thread.stale_discards");
pub(crate) static THREAD_SEND_DURATION: Moments =
    Moments::new("smartasset.thread.send_duration_seconds");

pub(crate) static AUTH_LOGINS: Counter = Counter::new("smartasset.auth.logins");
pub(crate) static AUTH_FAILURES: Counter = Counter::new("smartasset.auth.failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_counter(&CLIENT_TOKEN_REFRESHES);
    collector.register_counter(&CLIENT_TOKEN_REFRESH_FAILURES);

    collector.register_counter(&STREAM_DELTAS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&THREAD_SENDS_STARTED);
    collector.register_counter(&THREAD_SENDS_SETTLED);
    collector.register_counter(&THREAD_SENDS_FAILED);
    collector.register_counter(&THREAD_STALE_DISCARDS);
    collector.register_moments(&THREAD_SEND_DURATION);

    collector.register_counter(&AUTH_LOGINS);
    collector.register_counter(&AUTH_FAILURES);
}
