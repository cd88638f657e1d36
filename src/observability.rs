use biometrics::{Collector, Counter, Moments};

pub(crate) static TRANSPORT_REQUESTS: Counter = Counter::new("chatstream.transport.requests");
pub(crate) static TRANSPORT_REQUEST_ERRORS: Counter =
    Counter::new("chatstream.transport.request_errors");
pub(crate) static TRANSPORT_REQUEST_DURATION: Moments =
    Moments::new("chatstream.transport.request_duration_seconds");

pub(crate) static STREAM_BYTES: Counter = Counter::new("chatstream.stream.bytes");
pub(crate) static STREAM_CHUNKS: Counter = Counter::new("chatstream.stream.chunks");
pub(crate) static STREAM_SKIPPED_LINES: Counter = Counter::new("chatstream.stream.skipped_lines");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatstream.stream.errors");
pub(crate) static STREAM_TTFB: Moments = Moments::new("chatstream.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("chatstream.stream.duration_seconds");

pub(crate) static CONTROLLER_SENDS: Counter = Counter::new("chatstream.controller.sends");
pub(crate) static CONTROLLER_REDOS: Counter = Counter::new("chatstream.controller.redos");
pub(crate) static CONTROLLER_CANCELS: Counter = Counter::new("chatstream.controller.cancels");
pub(crate) static CONTROLLER_COMPLETIONS: Counter =
    Counter::new("chatstream.controller.completions");
pub(crate) static CONTROLLER_FAILURES: Counter = Counter::new("chatstream.controller.failures");

pub(crate) static STORE_WRITES: Counter = Counter::new("chatstream.store.writes");
pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("chatstream.store.write_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TRANSPORT_REQUESTS);
    collector.register_counter(&TRANSPORT_REQUEST_ERRORS);
    collector.register_moments(&TRANSPORT_REQUEST_DURATION);

    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_SKIPPED_LINES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&CONTROLLER_SENDS);
    collector.register_counter(&CONTROLLER_REDOS);
    collector.register_counter(&CONTROLLER_CANCELS);
    collector.register_counter(&CONTROLLER_COMPLETIONS);
    collector.register_counter(&CONTROLLER_FAILURES);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_WRITE_ERRORS);
}
