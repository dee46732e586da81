//! Wrapping sequence arithmetic.
//!
//! Input sequences are `u32` and compared on the half-range circle, so a
//! counter that wraps still orders correctly against recent values.

/// Input sequence number type alias.
pub type SequenceNumber = u32;

const HALF_RANGE: u32 = 1 << 31;

/// Returns true if `a` is newer than `b`, accounting for wraparound.
#[inline]
#[must_use]
pub const fn sequence_greater_than(a: SequenceNumber, b: SequenceNumber) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < HALF_RANGE
}

/// Returns true if `a` is the same as or older than `b`.
#[inline]
#[must_use]
pub const fn sequence_less_or_equal(a: SequenceNumber, b: SequenceNumber) -> bool {
    !sequence_greater_than(a, b)
}

/// Advances a sequence counter, skipping 0 (reserved for "nothing acknowledged").
#[inline]
#[must_use]
pub(crate) const fn next_sequence(current: SequenceNumber) -> SequenceNumber {
    match current.wrapping_add(1) {
        0 => 1,
        n => n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_without_wrap() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(!sequence_greater_than(5, 5));
        assert!(sequence_less_or_equal(5, 5));
        assert!(sequence_less_or_equal(4, 5));
    }

    #[test]
    fn test_ordering_across_wrap() {
        assert!(sequence_greater_than(1, u32::MAX));
        assert!(sequence_greater_than(3, u32::MAX - 2));
        assert!(sequence_less_or_equal(u32::MAX, 1));
    }

    #[test]
    fn test_next_sequence_skips_zero() {
        assert_eq!(next_sequence(1), 2);
        assert_eq!(next_sequence(u32::MAX), 1);
    }
}
