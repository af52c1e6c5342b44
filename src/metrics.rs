//! Prometheus metrics collection for linechat.
//!
//! Served as text on the HTTP control surface at `/metrics`.
//!
//! - `chat_connected_users` - Registered sessions (gauge)
//! - `chat_events_total{kind}` - Join/message/exit events broadcast
//! - `chat_message_fanout` - Recipients per broadcast (histogram)
//! - `chat_delivery_failures_total{stage}` - Per-peer write failures
//! - `chat_transcript_failures_total{kind}` - Failed transcript appends

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Total socket connections accepted by the gateway.
pub static CONNECTIONS_ACCEPTED: OnceLock<IntCounter> = OnceLock::new();

/// Total messages successfully written to peers.
pub static MESSAGES_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Events broadcast, by kind (join, message, exit).
pub static EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Per-peer delivery failures, by stage (message, prompt).
pub static DELIVERY_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Failed transcript appends, by event kind.
pub static TRANSCRIPT_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// HTTP control requests, by route and status code.
pub static HTTP_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges / Histograms
// ========================================================================

/// Currently registered sessions.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Recipients per broadcast.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Recording before `init` is a silent no-op, which
/// keeps unit tests free of global setup.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(CONNECTIONS_ACCEPTED, IntCounter::new("chat_connections_accepted_total", "Socket connections accepted"));
    register!(MESSAGES_SENT, IntCounter::new("chat_messages_sent_total", "Messages written to peers"));
    register!(EVENTS, IntCounterVec::new(Opts::new("chat_events_total", "Chat events broadcast by kind"), &["kind"]));
    register!(DELIVERY_FAILURES, IntCounterVec::new(Opts::new("chat_delivery_failures_total", "Per-peer delivery failures by stage"), &["stage"]));
    register!(TRANSCRIPT_FAILURES, IntCounterVec::new(Opts::new("chat_transcript_failures_total", "Failed transcript appends by event kind"), &["kind"]));
    register!(HTTP_REQUESTS, IntCounterVec::new(Opts::new("chat_http_requests_total", "HTTP control requests"), &["route", "status"]));
    register!(CONNECTED_USERS, IntGauge::new("chat_connected_users", "Registered chat sessions"));
    register!(MESSAGE_FANOUT, Histogram::with_opts(
        HistogramOpts::new("chat_message_fanout", "Recipients per broadcast")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
pub fn record_connection_accepted() {
    if let Some(c) = CONNECTIONS_ACCEPTED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_connected_users(count: usize) {
    if let Some(g) = CONNECTED_USERS.get() {
        g.set(count as i64);
    }
}

/// Record one completed broadcast.
#[inline]
pub fn record_broadcast(kind: &str, recipients: usize, delivered: usize) {
    if let Some(c) = EVENTS.get() {
        c.with_label_values(&[kind]).inc();
    }
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
    if let Some(c) = MESSAGES_SENT.get() {
        c.inc_by(delivered as u64);
    }
}

#[inline]
pub fn record_delivery_failure(stage: &str) {
    if let Some(c) = DELIVERY_FAILURES.get() {
        c.with_label_values(&[stage]).inc();
    }
}

#[inline]
pub fn record_transcript_failure(kind: &str) {
    if let Some(c) = TRANSCRIPT_FAILURES.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_http_request(route: &str, status: u16) {
    if let Some(c) = HTTP_REQUESTS.get() {
        c.with_label_values(&[route, &status.to_string()]).inc();
    }
}
