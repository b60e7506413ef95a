use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_operations_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub ride_offers_total: IntCounter,
    pub drivers_available: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_operations_total = IntCounterVec::new(
            Opts::new(
                "dispatch_operations_total",
                "Dispatch operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid dispatch_operations_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Latency of a matcher pass in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let ride_offers_total = IntCounter::new(
            "ride_offers_total",
            "Total ride offers pushed to drivers",
        )
        .expect("valid ride_offers_total metric");

        let drivers_available = IntGauge::new(
            "drivers_available",
            "Current number of drivers accepting ride requests",
        )
        .expect("valid drivers_available metric");

        registry
            .register(Box::new(dispatch_operations_total.clone()))
            .expect("register dispatch_operations_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(ride_offers_total.clone()))
            .expect("register ride_offers_total");
        registry
            .register(Box::new(drivers_available.clone()))
            .expect("register drivers_available");

        Self {
            registry,
            dispatch_operations_total,
            match_latency_seconds,
            ride_offers_total,
            drivers_available,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
