use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static ADMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("gate_admitted_total", "Requests admitted by the gate")
        .unwrap_or_else(|e| panic!("gate_admitted_total: {e}"));
    REGISTRY
        .register(Box::new(c.clone()))
        .unwrap_or_else(|e| panic!("register gate_admitted_total: {e}"));
    c
});

pub static REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("gate_rejected_total", "Requests rejected by the gate"),
        &["reason"],
    )
    .unwrap_or_else(|e| panic!("gate_rejected_total: {e}"));
    REGISTRY
        .register(Box::new(c.clone()))
        .unwrap_or_else(|e| panic!("register gate_rejected_total: {e}"));
    c
});

pub static DUPLICATE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "gate_duplicate_total",
        "Requests matching a payload seen within the cache span",
    )
    .unwrap_or_else(|e| panic!("gate_duplicate_total: {e}"));
    REGISTRY
        .register(Box::new(c.clone()))
        .unwrap_or_else(|e| panic!("register gate_duplicate_total: {e}"));
    c
});

pub static OVERRIDE_FALLBACK_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "gate_override_fallback_total",
            "Override failures answered by the default policy",
        ),
        &["stage"],
    )
    .unwrap_or_else(|e| panic!("gate_override_fallback_total: {e}"));
    REGISTRY
        .register(Box::new(c.clone()))
        .unwrap_or_else(|e| panic!("register gate_override_fallback_total: {e}"));
    c
});

pub static DEDUP_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("gate_dedup_entries", "Fingerprints held by the dedup cache")
        .unwrap_or_else(|e| panic!("gate_dedup_entries: {e}"));
    REGISTRY
        .register(Box::new(g.clone()))
        .unwrap_or_else(|e| panic!("register gate_dedup_entries: {e}"));
    g
});

/// Render every gate metric in the prometheus text format.
pub fn gather() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metrics = REGISTRY.gather();
    if encoder.encode(&metrics, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
