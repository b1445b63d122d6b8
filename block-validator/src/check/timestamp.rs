//! §4.6 checks 2 and 3: the future-time bound (hard failure) and
//! median-time-past (warn-only, §9 "tolerate fast test chains").

use subtree_primitives::BlockHeader;

use crate::error::BlockValidationError;

/// How far into the future a block's timestamp may claim to be relative to
/// local time.
pub const MAX_FUTURE_DRIFT_SECONDS: u32 = 2 * 60 * 60;

/// Check 2: `timestamp <= now + 2h`.
pub fn check_future_time(header: &BlockHeader, now: u32) -> Result<(), BlockValidationError> {
    let limit = now.saturating_add(MAX_FUTURE_DRIFT_SECONDS);
    if header.timestamp <= limit {
        Ok(())
    } else {
        Err(BlockValidationError::TimeTooNew(header.timestamp, limit))
    }
}

/// The median of `recent_timestamps` (the previous up-to-11 block
/// headers). For an even-length window the reference implementation takes
/// the upper-middle element rather than interpolating between the two
/// middle values; that quirk is preserved verbatim (§9
/// "Merkle-even-count quirk").
pub fn median_time_past(recent_timestamps: &[u32]) -> Option<u32> {
    if recent_timestamps.is_empty() {
        return None;
    }
    let mut sorted = recent_timestamps.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

/// Check 3: logs a warning when the block's timestamp does not exceed the
/// median-time-past, but never fails the block — test chains frequently
/// mine blocks faster than real timestamps advance.
pub fn check_median_time_past(header: &BlockHeader, recent_timestamps: &[u32]) {
    if let Some(mtp) = median_time_past(recent_timestamps) {
        if header.timestamp <= mtp {
            tracing::warn!(
                timestamp = header.timestamp,
                median_time_past = mtp,
                "block timestamp does not exceed median-time-past"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use subtree_primitives::Hash;

    use super::*;

    fn header(timestamp: u32) -> BlockHeader {
        BlockHeader { version: 2, prev_hash: Hash::ZERO, merkle_root: Hash::ZERO, timestamp, bits: 0, nonce: 0 }
    }

    #[test]
    fn accepts_timestamps_within_drift() {
        assert!(check_future_time(&header(100), 50).is_ok());
    }

    #[test]
    fn rejects_timestamps_too_far_ahead() {
        let error = check_future_time(&header(100_000), 0).unwrap_err();
        assert!(matches!(error, BlockValidationError::TimeTooNew(100_000, _)));
    }

    #[test]
    fn median_of_odd_count_is_the_true_middle() {
        assert_eq!(median_time_past(&[1, 5, 3]), Some(3));
    }

    #[test]
    fn median_of_even_count_takes_the_upper_middle() {
        // Sorted: [1, 3, 5, 7]; true median would be 4, upper-middle is 5.
        assert_eq!(median_time_past(&[7, 1, 5, 3]), Some(5));
    }

    #[test]
    fn empty_window_has_no_median() {
        assert_eq!(median_time_past(&[]), None);
    }
}
