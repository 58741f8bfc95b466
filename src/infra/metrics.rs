//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Fixes evaluated against the hazard index (monotonic)
    fixes_total: AtomicU64,
    /// Fixes since last report (reset on report)
    fixes_since_report: AtomicU64,
    fixes_rejected: AtomicU64,
    location_errors: AtomicU64,
    /// Fix evaluation latency (reset on report)
    eval_latency_sum_us: AtomicU64,
    eval_latency_max_us: AtomicU64,
    eval_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Cumulative latency histogram for scrapes (never reset)
    eval_latency_total_sum_us: AtomicU64,
    eval_latency_total_buckets: [AtomicU64; NUM_BUCKETS],
    alerts_total: AtomicU64,
    /// Current index size (gauge)
    hazards_loaded: AtomicU64,
    hazard_feed_failures: AtomicU64,
    routes_requested: AtomicU64,
    routes_failed: AtomicU64,
    routes_superseded: AtomicU64,
    narrations_total: AtomicU64,
    guidance_cancelled: AtomicU64,
    guidance_completed: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_total: AtomicU64::new(0),
            fixes_since_report: AtomicU64::new(0),
            fixes_rejected: AtomicU64::new(0),
            location_errors: AtomicU64::new(0),
            eval_latency_sum_us: AtomicU64::new(0),
            eval_latency_max_us: AtomicU64::new(0),
            eval_latency_buckets: Default::default(),
            eval_latency_total_sum_us: AtomicU64::new(0),
            eval_latency_total_buckets: Default::default(),
            alerts_total: AtomicU64::new(0),
            hazards_loaded: AtomicU64::new(0),
            hazard_feed_failures: AtomicU64::new(0),
            routes_requested: AtomicU64::new(0),
            routes_failed: AtomicU64::new(0),
            routes_superseded: AtomicU64::new(0),
            narrations_total: AtomicU64::new(0),
            guidance_cancelled: AtomicU64::new(0),
            guidance_completed: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record one evaluated fix and how long the evaluation took
    #[inline]
    pub fn record_fix_evaluated(&self, latency_us: u64) {
        self.fixes_total.fetch_add(1, Ordering::Relaxed);
        self.fixes_since_report.fetch_add(1, Ordering::Relaxed);
        self.eval_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.eval_latency_max_us, latency_us);
        let bucket = bucket_index(latency_us);
        self.eval_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.eval_latency_total_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.eval_latency_total_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_rejected(&self) {
        self.fixes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alerts(&self, count: u64) {
        self.alerts_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_hazards_loaded(&self, count: u64) {
        self.hazards_loaded.store(count, Ordering::Relaxed);
    }

    pub fn record_hazard_feed_failure(&self) {
        self.hazard_feed_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_route_requested(&self) {
        self.routes_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_route_failed(&self) {
        self.routes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_route_superseded(&self) {
        self.routes_superseded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_narrations(&self, count: u64) {
        self.narrations_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_guidance_cancelled(&self) {
        self.guidance_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_guidance_completed(&self) {
        self.guidance_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fixes_total(&self) -> u64 {
        self.fixes_total.load(Ordering::Relaxed)
    }

    pub fn alerts_total(&self) -> u64 {
        self.alerts_total.load(Ordering::Relaxed)
    }

    pub fn narrations_total(&self) -> u64 {
        self.narrations_total.load(Ordering::Relaxed)
    }

    pub fn routes_superseded(&self) -> u64 {
        self.routes_superseded.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let fixes_count = self.fixes_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.eval_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.eval_latency_max_us.swap(0, Ordering::Relaxed);
        let eval_buckets = swap_buckets(&self.eval_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let fixes_per_sec = if elapsed.as_secs_f64() > 0.0 {
            fixes_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if fixes_count > 0 { latency_sum / fixes_count } else { 0 };

        MetricsSummary {
            fixes_per_sec,
            eval_avg_us: avg_latency,
            eval_max_us: max_latency,
            eval_p50_us: percentile_from_buckets(&eval_buckets, 0.50),
            eval_p99_us: percentile_from_buckets(&eval_buckets, 0.99),
            eval_sum_us: latency_sum,
            eval_buckets,
            ..self.counters()
        }
    }

    /// Cumulative view for scraping. Leaves the periodic window untouched.
    pub fn snapshot(&self) -> MetricsSummary {
        let eval_buckets = load_buckets(&self.eval_latency_total_buckets);
        let eval_sum_us = self.eval_latency_total_sum_us.load(Ordering::Relaxed);
        let count: u64 = eval_buckets.iter().sum();

        MetricsSummary {
            eval_avg_us: if count > 0 { eval_sum_us / count } else { 0 },
            eval_max_us: self.eval_latency_max_us.load(Ordering::Relaxed),
            eval_p50_us: percentile_from_buckets(&eval_buckets, 0.50),
            eval_p99_us: percentile_from_buckets(&eval_buckets, 0.99),
            eval_sum_us,
            eval_buckets,
            ..self.counters()
        }
    }

    /// Monotonic counters and gauges, periodic fields zeroed
    fn counters(&self) -> MetricsSummary {
        MetricsSummary {
            fixes_total: self.fixes_total.load(Ordering::Relaxed),
            fixes_per_sec: 0.0,
            fixes_rejected: self.fixes_rejected.load(Ordering::Relaxed),
            location_errors: self.location_errors.load(Ordering::Relaxed),
            eval_avg_us: 0,
            eval_max_us: 0,
            eval_p50_us: 0,
            eval_p99_us: 0,
            eval_sum_us: 0,
            eval_buckets: [0; NUM_BUCKETS],
            alerts_total: self.alerts_total.load(Ordering::Relaxed),
            hazards_loaded: self.hazards_loaded.load(Ordering::Relaxed),
            hazard_feed_failures: self.hazard_feed_failures.load(Ordering::Relaxed),
            routes_requested: self.routes_requested.load(Ordering::Relaxed),
            routes_failed: self.routes_failed.load(Ordering::Relaxed),
            routes_superseded: self.routes_superseded.load(Ordering::Relaxed),
            narrations_total: self.narrations_total.load(Ordering::Relaxed),
            guidance_cancelled: self.guidance_cancelled.load(Ordering::Relaxed),
            guidance_completed: self.guidance_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the HTTP endpoint)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub fixes_total: u64,
    pub fixes_per_sec: f64,
    pub fixes_rejected: u64,
    pub location_errors: u64,
    pub eval_avg_us: u64,
    pub eval_max_us: u64,
    pub eval_p50_us: u64,
    pub eval_p99_us: u64,
    pub eval_sum_us: u64,
    /// Fix evaluation latency histogram, same bounds as `METRICS_BUCKET_BOUNDS`
    pub eval_buckets: [u64; NUM_BUCKETS],
    pub alerts_total: u64,
    pub hazards_loaded: u64,
    pub hazard_feed_failures: u64,
    pub routes_requested: u64,
    pub routes_failed: u64,
    pub routes_superseded: u64,
    pub narrations_total: u64,
    pub guidance_cancelled: u64,
    pub guidance_completed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            fixes_total = %self.fixes_total,
            fixes_per_sec = format!("{:.1}", self.fixes_per_sec),
            rejected = %self.fixes_rejected,
            location_errors = %self.location_errors,
            eval_p50_us = %self.eval_p50_us,
            eval_p99_us = %self.eval_p99_us,
            alerts = %self.alerts_total,
            hazards = %self.hazards_loaded,
            routes = %self.routes_requested,
            routes_failed = %self.routes_failed,
            narrations = %self.narrations_total,
            "metrics"
        );
    }
}
