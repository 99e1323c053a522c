//! Kademlia protocol parameters, lifted into a value type (rather than
//! fixed constants) so a join exchange can adopt a peer's parameters
//! without touching global state.

use std::time::Duration;

/// Tuning parameters for one DHT instance.
///
/// A successful `join` adopts `(alpha, b, k, t_expire, t_replicate)` from
/// the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KadConfig {
    /// Lookup parallelism.
    pub alpha: u32,
    /// Replication factor / bucket capacity.
    pub k: usize,
    /// Bucket split fan-out: one of 1, 2, 4, 8.
    pub beta: u8,
    /// Node/key id length in bytes.
    pub b: u8,
    /// Value expiry period for locally-published entries, seconds.
    pub t_expire: u64,
    /// Reference republish interval, seconds. Derived as `max(1, t_expire -
    /// 10)` so a reference is republished comfortably before its value
    /// would expire.
    pub t_republish: u64,
    /// Replication period, seconds.
    pub t_replicate: u64,
    /// Bucket refresh period, seconds.
    pub t_refresh_bucket: u64,
    /// How long to wait for a JOIN reply.
    pub t_join: Duration,
    /// How long to wait for any other request's response.
    pub t_response: Duration,
    /// Consecutive failures before a contact is considered dead.
    pub r_ping: u32,
    /// Join retries before giving up and returning to `Init`.
    pub r_join: u32,
    /// Sleep between join retries.
    pub join_intv: Duration,
}

impl KadConfig {
    /// Builds the bootstrap-side defaults for a fresh DHT with no peer to
    /// adopt parameters from: `b` bytes of id, everything else protocol
    /// constants.
    pub fn bootstrap_defaults(b: u8) -> Self {
        let t_expire = 86_400;
        Self {
            alpha: 3,
            k: 8,
            beta: 8,
            b,
            t_expire,
            t_republish: t_expire.saturating_sub(10).max(1),
            t_replicate: 900,
            t_refresh_bucket: 900,
            t_join: Duration::from_secs(8),
            t_response: Duration::from_secs(5),
            r_ping: 2,
            r_join: 8,
            join_intv: Duration::from_secs(1),
        }
    }

    /// Adopts a peer's advertised parameters on a successful JOIN.
    pub fn adopt(mut self, alpha: u32, b: u8, k: usize, t_expire: u64, t_replicate: u64) -> Self {
        self.alpha = alpha;
        self.b = b;
        self.k = k;
        self.t_expire = t_expire;
        self.t_republish = t_expire.saturating_sub(10).max(1);
        self.t_replicate = t_replicate;
        self
    }

    /// The periodic worker's sweep interval: `gcd(t_expire, t_republish,
    /// t_replicate, t_refresh_bucket) / 2`, computed once at bootstrap/join
    /// and cached by the caller.
    pub fn worker_interval(&self) -> Duration {
        let g = gcd(
            gcd(self.t_expire, self.t_republish),
            gcd(self.t_replicate, self.t_refresh_bucket),
        );
        Duration::from_secs((g / 2).max(1))
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_interval_is_half_the_gcd_of_the_four_periods() {
        let cfg = KadConfig::bootstrap_defaults(20);
        // gcd(86400, 86390, 900, 900) == 10 -> interval 5s.
        assert_eq!(cfg.worker_interval(), Duration::from_secs(5));
    }

    #[test]
    fn adopt_recomputes_republish_from_new_expiry() {
        let cfg = KadConfig::bootstrap_defaults(20).adopt(3, 20, 8, 100, 900);
        assert_eq!(cfg.t_expire, 100);
        assert_eq!(cfg.t_republish, 90);
    }
}
