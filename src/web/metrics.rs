use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);
static HTTP_REQUESTS: AtomicU64 = AtomicU64::new(0);
static AUTH_FAILURES: AtomicU64 = AtomicU64::new(0);
static TRANSACTIONS_CREATED: AtomicU64 = AtomicU64::new(0);
static BUDGET_SNAPSHOTS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static RATE_REFRESHES: AtomicU64 = AtomicU64::new(0);
static RATE_REFRESH_FAILURES: AtomicU64 = AtomicU64::new(0);
static HEALTH_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static HEALTH_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    /// Pins the uptime origin; later calls are no-ops.
    pub fn start() {
        Lazy::force(&STARTED_AT);
    }

    pub fn uptime_seconds() -> u64 {
        STARTED_AT.elapsed().as_secs()
    }

    pub fn http_request() {
        HTTP_REQUESTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_failure() {
        AUTH_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transaction_created() {
        TRANSACTIONS_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn budget_snapshots_written(count: u64) {
        BUDGET_SNAPSHOTS_WRITTEN.fetch_add(count, Ordering::Relaxed);
    }

    pub fn rate_refresh(success: bool) {
        if success {
            RATE_REFRESHES.fetch_add(1, Ordering::Relaxed);
        } else {
            RATE_REFRESH_FAILURES.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn health_cache(hit: bool) {
        if hit {
            HEALTH_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
        } else {
            HEALTH_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn http_requests() -> u64 {
        HTTP_REQUESTS.load(Ordering::Relaxed)
    }
}

pub fn format_prometheus() -> String {
    let counters = [
        (
            "finance_http_requests_total",
            "Total number of HTTP requests served",
            HTTP_REQUESTS.load(Ordering::Relaxed),
        ),
        (
            "finance_auth_failures_total",
            "Requests rejected for a missing or invalid session",
            AUTH_FAILURES.load(Ordering::Relaxed),
        ),
        (
            "finance_transactions_created_total",
            "Transactions recorded through the API",
            TRANSACTIONS_CREATED.load(Ordering::Relaxed),
        ),
        (
            "finance_budget_snapshots_total",
            "Budget history rows written by the scheduler",
            BUDGET_SNAPSHOTS_WRITTEN.load(Ordering::Relaxed),
        ),
        (
            "finance_rate_refreshes_total",
            "Successful exchange rate refreshes",
            RATE_REFRESHES.load(Ordering::Relaxed),
        ),
        (
            "finance_rate_refresh_failures_total",
            "Failed exchange rate refreshes",
            RATE_REFRESH_FAILURES.load(Ordering::Relaxed),
        ),
        (
            "finance_health_cache_hits_total",
            "Health reports served from cache",
            HEALTH_CACHE_HITS.load(Ordering::Relaxed),
        ),
        (
            "finance_health_cache_misses_total",
            "Health reports computed from the database",
            HEALTH_CACHE_MISSES.load(Ordering::Relaxed),
        ),
    ];

    let mut out = format!(
        "# HELP finance_uptime_seconds Number of seconds the service has been running\n\
         # TYPE finance_uptime_seconds gauge\n\
         finance_uptime_seconds {}\n",
        Metrics::uptime_seconds()
    );
    for (name, help, value) in counters {
        out.push_str(&format!(
            "\n# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
        ));
    }
    out
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    res.body(format_prometheus());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increase() {
        let before = TRANSACTIONS_CREATED.load(Ordering::Relaxed);
        Metrics::transaction_created();
        Metrics::budget_snapshots_written(3);
        Metrics::rate_refresh(false);
        assert!(TRANSACTIONS_CREATED.load(Ordering::Relaxed) > before);
        assert!(BUDGET_SNAPSHOTS_WRITTEN.load(Ordering::Relaxed) >= 3);
        assert!(RATE_REFRESH_FAILURES.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn format_prometheus_includes_all_metrics() {
        let output = format_prometheus();
        assert!(output.contains("# TYPE finance_uptime_seconds gauge"));
        assert!(output.contains("finance_http_requests_total"));
        assert!(output.contains("finance_budget_snapshots_total"));
        assert!(output.contains("# TYPE finance_health_cache_hits_total counter"));
    }
}
