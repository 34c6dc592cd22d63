//! Amount handling helpers.
//!
//! The provider speaks minor currency units (integer cents); the ledger and
//! the order subsystem speak major units rounded to 2 decimals. Conversions
//! round half-up.

/// Round a major-unit amount to 2 decimal places, half-up.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Minor units → major units (10000 → 100.00).
pub fn from_minor(minor: i64) -> f64 {
    round2(minor as f64 / 100.0)
}

/// Major units → minor units, half-up (100.005 → 10001).
pub fn to_minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Tolerance for floating-point comparisons on major-unit amounts.
pub const EPSILON: f64 = 0.0001;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_minor_to_major() {
        assert_eq!(from_minor(10000), 100.0);
        assert_eq!(from_minor(4050), 40.5);
        assert_eq!(from_minor(1), 0.01);
    }

    #[test]
    fn converts_major_to_minor_half_up() {
        assert_eq!(to_minor(100.0), 10000);
        assert_eq!(to_minor(40.005), 4001);
        assert_eq!(to_minor(0.01), 1);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(39.999999), 40.0);
        assert_eq!(round2(0.125), 0.13);
    }
}
