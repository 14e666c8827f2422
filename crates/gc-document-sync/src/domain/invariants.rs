//! # Domain Invariants
//!
//! Rules every scan result and probe sequence must satisfy.

use shared_types::{DocumentRecord, TokenId};

use super::value_objects::ScanBounds;

/// First identifier the contract assigns.
pub const DEFAULT_SCAN_START: u64 = 1;

/// Highest identifier the scanner probes.
pub const DEFAULT_UPPER_BOUND: u64 = 20;

/// Consecutive absent identifiers that end a scan.
pub const DEFAULT_MISS_TOLERANCE: u32 = 3;

/// Gas limit headroom over the node's estimate, in percent.
pub const GAS_BUFFER_PERCENT: u64 = 20;

/// Invariant: no returned record has the zero owner.
pub fn invariant_no_absent_records(records: &[DocumentRecord]) -> bool {
    records.iter().all(DocumentRecord::exists)
}

/// Invariant: records are in strictly ascending identifier order.
pub fn invariant_ascending(records: &[DocumentRecord]) -> bool {
    records.windows(2).all(|w| w[0].token_id < w[1].token_id)
}

/// Invariant: a probe sequence stays inside the window, is sequential from
/// the start, and stops after `miss_tolerance` consecutive misses.
///
/// `probes` pairs each probed identifier with whether it counted as a miss.
pub fn invariant_probe_sequence(probes: &[(TokenId, bool)], bounds: &ScanBounds) -> bool {
    if probes.len() as u64 > bounds.max_probes() {
        return false;
    }

    let mut expected = bounds.start;
    let mut consecutive = 0u32;
    for (token_id, missed) in probes {
        if *token_id != expected || *token_id > bounds.upper_bound {
            return false;
        }
        // A probe after the tolerance was reached should never have happened.
        if consecutive >= bounds.miss_tolerance {
            return false;
        }
        consecutive = if *missed { consecutive + 1 } else { 0 };
        expected = expected.next();
    }
    true
}

/// Gas limit for an estimate, rounded up.
pub fn with_gas_buffer(estimate: u64) -> u64 {
    let buffered = u128::from(estimate) * u128::from(100 + GAS_BUFFER_PERCENT);
    let limit = buffered.div_ceil(100);
    u64::try_from(limit).unwrap_or(u64::MAX)
}
