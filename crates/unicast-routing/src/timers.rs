//! Periodic-timer configuration for the routing policy, lifted into a
//! config struct (rather than fixed constants) so tests can shrink the
//! periods instead of waiting on wall-clock time.

use std::time::Duration;

/// Periods driving the routing policy's three background threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTimers {
    /// How often the flooder re-announces local adjacencies and ages out
    /// stale ones.
    pub ls_update_time: Duration,
    /// How long an adjacency may go unrefreshed before it's dropped.
    pub ls_timeo: Duration,
    /// How often each QoS cube's routing table is recomputed and the PFF
    /// rebuilt.
    pub recalc_time: Duration,
}

impl Default for RoutingTimers {
    fn default() -> Self {
        Self {
            ls_update_time: Duration::from_secs(15),
            ls_timeo: Duration::from_secs(60),
            recalc_time: Duration::from_secs(4),
        }
    }
}
