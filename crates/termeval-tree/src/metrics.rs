//! Metrics/tracing hooks.
//!
//! Keeps the planner free of telemetry stacks; wire a subscriber in the
//! binary layer to collect these.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "termeval", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
