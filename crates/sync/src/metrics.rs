//! Prometheus metrics for sync runs and transfers.

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Registry holding every PhotoSync metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static SYNC_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("photosync_sync_runs_total", "Sync runs started, by trigger"),
        &["trigger"],
    )
    .expect("metric creation failed")
});

pub static ITEMS_QUEUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_items_queued_total",
        "Items handed to the transfer engine",
    )
    .expect("metric creation failed")
});

pub static ITEMS_ALREADY_PRESENT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "photosync_items_already_present_total",
        "Items whose content already existed remotely",
    )
    .expect("metric creation failed")
});

pub static ITEM_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "photosync_item_failures_total",
            "Items skipped because of a failure, by pipeline stage",
        ),
        &["stage"],
    )
    .expect("metric creation failed")
});

pub static TRANSFERS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "photosync_transfers_total",
            "Transfers that reached a terminal state, by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static TRANSFERS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "photosync_transfers_in_flight",
        "Accepted transfers that have not completed",
    )
    .expect("metric creation failed")
});

pub static TRANSFER_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "photosync_transfer_duration_seconds",
            "Time taken by a single PUT attempt",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(SYNC_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ITEMS_QUEUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ITEMS_ALREADY_PRESENT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ITEM_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TRANSFERS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TRANSFERS_IN_FLIGHT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TRANSFER_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// Text exposition of every registered metric.
pub fn gather_text() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
