//! Lookup metrics

use metrics::Counter;

/// Counters shared by lookups and their query tasks.
#[derive(Clone, Debug)]
pub(crate) struct LookupMetrics {
    /// Number of lookups created
    pub(crate) started_total: Counter,
    /// Number of FINDNODE queries dispatched
    pub(crate) queries_total: Counter,
    /// Number of queries that returned nothing useful
    pub(crate) query_failures_total: Counter,
    /// Number of nodes dropped from the routing table after repeated failures
    pub(crate) evictions_total: Counter,
    /// Number of topology observations dropped because the observer lagged
    pub(crate) observer_dropped_total: Counter,
}

impl Default for LookupMetrics {
    fn default() -> Self {
        Self {
            started_total: metrics::counter!("discovery.lookup.started_total"),
            queries_total: metrics::counter!("discovery.lookup.queries_total"),
            query_failures_total: metrics::counter!("discovery.lookup.query_failures_total"),
            evictions_total: metrics::counter!("discovery.lookup.evictions_total"),
            observer_dropped_total: metrics::counter!(
                "discovery.lookup.observer_dropped_total"
            ),
        }
    }
}

impl LookupMetrics {
    pub(crate) fn inc_started(&self) {
        self.started_total.increment(1);
    }

    pub(crate) fn inc_queries(&self) {
        self.queries_total.increment(1);
    }

    pub(crate) fn inc_query_failures(&self) {
        self.query_failures_total.increment(1);
    }

    pub(crate) fn inc_evictions(&self) {
        self.evictions_total.increment(1);
    }

    pub(crate) fn inc_observer_dropped(&self) {
        self.observer_dropped_total.increment(1);
    }
}
