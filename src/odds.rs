//! Odds normalisation.
//!
//! Pure conversions between American (moneyline-style) prices, decimal
//! odds and implied probability. Every other module goes through these
//! helpers, so a decimal price below or equal to 1.0 never leaves here.

/// Neutral fallback used for a zero or nonsensical American price.
pub const NEUTRAL_AMERICAN: f64 = 100.0;

/// Decimal odds equivalent of [`NEUTRAL_AMERICAN`].
pub const NEUTRAL_DECIMAL: f64 = 2.0;

/// Smallest decimal price we will ever hand out.
const MIN_DECIMAL: f64 = 1.0001;

/// Convert an American price to decimal odds.
///
/// `+150` → `2.50`, `-130` → `1.769…`. Prices strictly between -100 and
/// +100 (including 0) do not exist on the American scale and fall back to
/// the neutral +100.
pub fn american_to_decimal(american: f64) -> f64 {
    if !american.is_finite() || american.abs() < 100.0 {
        return NEUTRAL_DECIMAL;
    }
    let decimal = if american > 0.0 {
        1.0 + american / 100.0
    } else {
        1.0 + 100.0 / american.abs()
    };
    decimal.max(MIN_DECIMAL)
}

/// Convert decimal odds back to an American price.
///
/// Decimal at or above 2.0 maps to the positive side, below 2.0 to the
/// negative side, so `decimal_to_american(american_to_decimal(x)) == x`
/// for any valid `x` up to float rounding.
pub fn decimal_to_american(decimal: f64) -> f64 {
    let decimal = sanitize_decimal(decimal);
    if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    }
}

/// Implied probability of a decimal price (1 / decimal).
pub fn implied_probability(decimal: f64) -> f64 {
    1.0 / sanitize_decimal(decimal)
}

/// Decimal odds that a probability would be fair at.
pub fn probability_to_decimal(probability: f64) -> f64 {
    let p = probability.clamp(0.0001, 0.9999);
    1.0 / p
}

/// Clamp a decimal price into the valid range, mapping garbage to neutral.
pub fn sanitize_decimal(decimal: f64) -> f64 {
    if !decimal.is_finite() || decimal <= 1.0 {
        if decimal.is_finite() && decimal > 0.0 && decimal <= 1.0 {
            // A price of exactly 1.0 pays nothing; keep it just above.
            return MIN_DECIMAL;
        }
        return NEUTRAL_DECIMAL;
    }
    decimal
}

/// Map an American price onto a continuous "cents" scale.
///
/// -105 and +105 sit 10 cents apart here rather than 210, which is how
/// line movement is measured on the native scale.
pub fn american_cents(american: f64) -> f64 {
    if american >= 100.0 {
        american - 100.0
    } else if american <= -100.0 {
        american + 100.0
    } else {
        0.0
    }
}

/// Absolute price movement between two American prices, in cents.
pub fn price_delta(previous: f64, current: f64) -> f64 {
    (american_cents(current) - american_cents(previous)).abs()
}

/// Whether a line is a whole number (a push is possible on it).
pub fn is_whole_line(point: f64) -> bool {
    (point - point.round()).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_decimal() {
        assert!((american_to_decimal(150.0) - 2.5).abs() < 1e-12);
        assert!((american_to_decimal(-130.0) - (1.0 + 100.0 / 130.0)).abs() < 1e-12);
        assert!((american_to_decimal(100.0) - 2.0).abs() < 1e-12);
        assert!((american_to_decimal(-100.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_price_is_neutral() {
        assert_eq!(american_to_decimal(0.0), NEUTRAL_DECIMAL);
        assert_eq!(american_to_decimal(50.0), NEUTRAL_DECIMAL);
        assert_eq!(american_to_decimal(f64::NAN), NEUTRAL_DECIMAL);
    }

    #[test]
    fn test_round_trip() {
        for price in [-10000.0, -450.0, -130.0, -110.0, -101.0, 100.0, 105.0, 150.0, 2500.0] {
            let back = decimal_to_american(american_to_decimal(price));
            assert!((back - price).abs() < 1e-6, "{price} came back as {back}");
        }
    }

    #[test]
    fn test_implied_probability_is_reciprocal() {
        for d in [1.01, 1.5, 1.91, 2.0, 3.75, 21.0] {
            assert!((implied_probability(d) - 1.0 / d).abs() < 1e-12);
        }
    }

    #[test]
    fn test_implied_probability_never_divides_by_zero() {
        assert_eq!(implied_probability(0.0), 0.5);
        assert!(implied_probability(1.0) < 1.0);
        assert!(implied_probability(-3.0).is_finite());
    }

    #[test]
    fn test_cents_scale_across_even() {
        assert!((price_delta(-105.0, 105.0) - 10.0).abs() < 1e-12);
        assert!((price_delta(-110.0, -120.0) - 10.0).abs() < 1e-12);
        assert!((price_delta(150.0, 140.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_whole_line() {
        assert!(is_whole_line(3.0));
        assert!(is_whole_line(-7.0));
        assert!(!is_whole_line(3.5));
        assert!(!is_whole_line(44.5));
    }

    #[test]
    fn test_probability_to_decimal() {
        assert!((probability_to_decimal(0.5) - 2.0).abs() < 1e-12);
        assert!(probability_to_decimal(0.0).is_finite());
    }
}
