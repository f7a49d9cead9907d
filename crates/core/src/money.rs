//! Money helpers.
//!
//! Monetary amounts are accumulated as `f64` and rounded to two decimal
//! places at every comparison and output boundary. Half-cent values round
//! away from zero.

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    ((value + f64::EPSILON) * 100.0).round() / 100.0
}

/// Equal to the cent.
pub fn money_eq(a: f64, b: f64) -> bool {
    (round2(a) - round2(b)).abs() < 1e-9
}

/// Within a cent of zero.
pub fn within_cent(value: f64) -> bool {
    value.abs() < 0.01
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(1.004), 1.0);
    }

    #[test]
    fn float_accumulation_compares_to_the_cent() {
        // 0.1 + 0.2 style drift must not break equality.
        let total = (0..10).map(|_| 0.1).sum::<f64>();
        assert!(money_eq(total, 1.0));
        assert!(!money_eq(1.0, 1.01));
    }

    #[test]
    fn within_cent_bounds() {
        assert!(within_cent(0.0099));
        assert!(within_cent(-0.0099));
        assert!(!within_cent(0.01));
    }
}
