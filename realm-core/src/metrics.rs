use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub loads_started: IntCounter,
    pub loads_skipped: IntCounter,
    pub loads_failed: IntCounter,
    pub loads_discarded: IntCounter,
    pub mutations_sent: IntCounter,
    pub mutations_succeeded: IntCounter,
    pub mutations_failed: IntCounter,
    pub mutations_rejected_locally: IntCounter,
    pub inflight_mutations: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("valid counter opts");
    registry.register(Box::new(c.clone())).ok();
    c
}

impl Metrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        let inflight_mutations =
            IntGauge::with_opts(Opts::new("inflight_mutations", "Mutations in flight"))
                .expect("valid gauge opts");
        registry.register(Box::new(inflight_mutations.clone())).ok();
        Arc::new(Self {
            loads_started: counter(registry, "loads_started", "Collection fetches dispatched"),
            loads_skipped: counter(registry, "loads_skipped", "Fetches skipped by the load guard"),
            loads_failed: counter(registry, "loads_failed", "Collection fetches failed"),
            loads_discarded: counter(
                registry,
                "loads_discarded",
                "Fetch results dropped because a newer load superseded them",
            ),
            mutations_sent: counter(registry, "mutations_sent", "Mutations sent to the server"),
            mutations_succeeded: counter(registry, "mutations_succeeded", "Mutations succeeded"),
            mutations_failed: counter(registry, "mutations_failed", "Mutations failed"),
            mutations_rejected_locally: counter(
                registry,
                "mutations_rejected_locally",
                "Mutations stopped by client-side validation",
            ),
            inflight_mutations,
        })
    }

    /// Metrics bound to a throwaway registry.
    pub fn unregistered() -> Arc<Self> {
        Self::new(&Registry::new())
    }
}
