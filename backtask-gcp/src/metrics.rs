//! Prometheus metrics for enqueueing
//!
//! Histograms for latency measurements with defined buckets, counters for
//! success/failure tracking.

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    /// Duration of task enqueue operations in seconds
    ///
    /// Labels:
    /// - operation: "resolve" (function URL lookup), "api" (Cloud Tasks call), "total" (end-to-end)
    pub static ref ENQUEUE_DURATION: HistogramVec = register_histogram_vec!(
        "backtask_enqueue_duration_seconds",
        "Duration of task enqueue operations",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("backtask_enqueue_duration_seconds metric registration");

    /// Total number of task enqueue attempts
    ///
    /// Labels:
    /// - status: "success", "failure"
    pub static ref ENQUEUE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "backtask_enqueue_total",
        "Total number of task enqueue attempts",
        &["status"]
    )
    .expect("backtask_enqueue_total metric registration");

    /// Duration of token acquisition in seconds
    pub static ref TOKEN_ACQUISITION_DURATION: HistogramVec = register_histogram_vec!(
        "backtask_token_acquisition_duration_seconds",
        "Duration of OAuth2 token acquisition",
        &["cache_hit"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("backtask_token_acquisition_duration_seconds metric registration");

    /// Tasks delivered to the dispatched handler
    ///
    /// Labels:
    /// - status: "success", "failure", "rejected"
    pub static ref DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "backtask_dispatched_total",
        "Total number of tasks delivered to the processtask handler",
        &["status"]
    )
    .expect("backtask_dispatched_total metric registration");
}
