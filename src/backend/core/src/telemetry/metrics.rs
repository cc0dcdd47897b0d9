//! Metric names and recording helpers for the access engine.
//!
//! Recording goes through the `metrics` facade; installing an exporter is left
//! to the host process.

use metrics::{counter, describe_counter};

/// Which evaluator (or the cache) produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    Cache,
    ScopedGrant,
    LegacyRole,
    /// No evaluator allowed the request, or it was rejected before evaluation.
    Default,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::ScopedGrant => "scoped_grant",
            Self::LegacyRole => "legacy_role",
            Self::Default => "default",
        }
    }
}

/// The two families of cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFamily {
    Decision,
    PropertyOrganization,
}

impl CacheFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::PropertyOrganization => "property_org",
        }
    }
}

/// Register descriptions for every metric the engine emits.
pub fn describe_metrics() {
    describe_counter!(
        "access_decisions_total",
        "Permission decisions by outcome and deciding path"
    );
    describe_counter!("access_cache_hits_total", "Access cache hits by family");
    describe_counter!("access_cache_misses_total", "Access cache misses by family");
    describe_counter!(
        "access_cache_errors_total",
        "Cache operations that failed and were treated as unavailable"
    );
    describe_counter!("access_denials_total", "Hierarchy guard denials by guard");
    describe_counter!("gatehouse_errors_total", "Errors constructed, by code");
}

pub(crate) fn record_decision(allowed: bool, path: DecisionPath) {
    counter!(
        "access_decisions_total",
        "outcome" => if allowed { "allow" } else { "deny" },
        "path" => path.as_str(),
    )
    .increment(1);
}

pub(crate) fn record_cache_lookup(family: CacheFamily, hit: bool) {
    if hit {
        counter!("access_cache_hits_total", "family" => family.as_str()).increment(1);
    } else {
        counter!("access_cache_misses_total", "family" => family.as_str()).increment(1);
    }
}

pub(crate) fn record_cache_error(op: &'static str) {
    counter!("access_cache_errors_total", "op" => op).increment(1);
}

pub(crate) fn record_denial(guard: &'static str) {
    counter!("access_denials_total", "guard" => guard).increment(1);
}
