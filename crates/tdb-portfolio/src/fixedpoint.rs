//! Fixed-point money helpers.
//!
//! Prices, quantities and P&L are carried as `i64` micros (1e-6) through the
//! whole matching pipeline, so fractional units match exactly. Products go
//! through `i128`, are rescaled once, and are clamped back, so a
//! pathological quantity never wraps silently.
//!
//! Conversion to a floating-point rupee amount happens exactly once, at the
//! reporting boundary, via [`micros_to_money`] which rounds to cents
//! (half away from zero). Summing already-rounded values is never done.

/// Price/cash scale: micros (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;

/// Quantity scale: one unit is `QTY_SCALE` qty micros.
pub const QTY_SCALE: i64 = MICROS_SCALE;

const MICROS_PER_CENT: i64 = MICROS_SCALE / 100;

/// `qty_micros × price_micros` in cash micros, widened to `i128` and rounded
/// half away from zero back onto the micros grid.
#[inline]
pub fn mul_qty_price_micros(qty_micros: i64, price_micros: i64) -> i128 {
    round_div_half_away(
        (qty_micros as i128) * (price_micros as i128),
        QTY_SCALE as i128,
    )
}

/// Whole units -> qty micros. `None` on overflow.
pub fn qty_micros_from_units(units: i64) -> Option<i64> {
    units.checked_mul(QTY_SCALE)
}

#[inline]
pub fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// Micros → currency units rounded to 2 decimal places (half away from zero).
pub fn micros_to_money(micros: i64) -> f64 {
    let cents = round_div_half_away(micros as i128, MICROS_PER_CENT as i128);
    cents as f64 / 100.0
}

/// Round a ratio to 2 decimal places. Non-finite input yields 0.
pub fn round_2dp(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x * 100.0).round() / 100.0
}

/// Convert a floating-point price to micros, rounding to the nearest micro.
/// Returns `None` for non-finite input or values outside `i64` range.
pub fn micros_from_f64(x: f64) -> Option<i64> {
    if !x.is_finite() {
        return None;
    }
    let scaled = (x * MICROS_SCALE as f64).round();
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return None;
    }
    Some(scaled as i64)
}

fn round_div_half_away(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d {
        q + n.signum()
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: i64 = MICROS_SCALE;

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(micros_to_money(50 * M), 50.0);
        assert_eq!(micros_to_money(1_005_000), 1.01);
        assert_eq!(micros_to_money(1_004_999), 1.0);
        assert_eq!(micros_to_money(-1_005_000), -1.01);
        assert_eq!(micros_to_money(-4_999), 0.0);
    }

    #[test]
    fn mul_does_not_overflow_i64_intermediate() {
        let p = mul_qty_price_micros(i64::MAX, 2 * M * M);
        assert_eq!(i128_to_i64_clamp(p), i64::MAX);
        assert_eq!(i128_to_i64_clamp(-p), i64::MIN);
    }

    #[test]
    fn mul_rescales_fractional_quantities() {
        // 10 units @ 5.00
        assert_eq!(mul_qty_price_micros(10 * M, 5 * M), 50 * M as i128);
        // 2.5 units @ 4.00
        assert_eq!(mul_qty_price_micros(2_500_000, 4 * M), 10 * M as i128);
        // 0.000001 units @ 0.5 micros rounds half away from zero
        assert_eq!(mul_qty_price_micros(1, 500_000), 1);
        assert_eq!(mul_qty_price_micros(1, -500_000), -1);
        assert_eq!(qty_micros_from_units(3), Some(3 * M));
        assert_eq!(qty_micros_from_units(i64::MAX), None);
    }

    #[test]
    fn f64_conversion() {
        assert_eq!(micros_from_f64(100.5), Some(100_500_000));
        assert_eq!(micros_from_f64(0.000_000_4), Some(0));
        assert_eq!(micros_from_f64(f64::NAN), None);
        assert_eq!(micros_from_f64(f64::INFINITY), None);
        assert_eq!(micros_from_f64(1e300), None);
    }

    #[test]
    fn ratio_rounding() {
        assert_eq!(round_2dp(66.666_666), 66.67);
        assert_eq!(round_2dp(f64::NAN), 0.0);
        assert_eq!(round_2dp(f64::INFINITY), 0.0);
    }
}
