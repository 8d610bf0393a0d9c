use primitive_types::U256;

const PRECISION: u64 = 1_000_000_000_000_000_000;

/// Whether `actual` is within `max_relative_error` (e.g. `0.0005` for 0.05%)
/// of `expected`. A zero expectation only accepts zero.
pub fn is_equal_with_error(actual: U256, expected: U256, max_relative_error: f64) -> bool {
    let parts = U256::from((max_relative_error * PRECISION as f64).round() as u64);
    let difference = actual.abs_diff(expected);
    match (
        difference.checked_mul(PRECISION.into()),
        expected.checked_mul(parts),
    ) {
        (Some(scaled_difference), Some(tolerance)) => scaled_difference <= tolerance,
        // Too large for exact comparison, fall back to dividing first.
        _ => difference / parts.max(U256::one()) <= expected / PRECISION,
    }
}

#[track_caller]
pub fn assert_equal_with_error(actual: U256, expected: U256, max_relative_error: f64) {
    assert!(
        is_equal_with_error(actual, expected, max_relative_error),
        "actual {actual} differs from expected {expected} by more than {max_relative_error}"
    );
}
