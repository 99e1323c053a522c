//! Implementation parameters for the unicast layer, carried as named
//! constants instead of scattering magic numbers through the crate.

/// Upper bound on the number of independent QoS cubes (forwarding planes).
pub const MAX_QOS_CUBES: usize = 8;

/// First non-reserved EID. Component EIDs live in `[0, RESERVED_EID_MAX)`.
pub const RESERVED_EID_MAX: u64 = 4;

/// Soft capacity hint for concurrent flows per process; data structures
/// that track flows aren't bounded to this size, it's a sizing guideline
/// for callers provisioning a process.
pub const MAX_FLOWS: usize = 8192;
