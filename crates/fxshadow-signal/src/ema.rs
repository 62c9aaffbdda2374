//! Exponential moving average.

use rust_decimal::Decimal;

/// Adjusted exponentially weighted mean of `values` for the given span,
/// returned for the last element.
///
/// Uses `alpha = 2 / (span + 1)` and normalises by the sum of weights, so the
/// early values are not biased toward the first observation:
///
/// `y_t = sum((1-a)^i * x_{t-i}) / sum((1-a)^i)`
///
/// Returns `None` for an empty series or a zero span.
pub fn ewm_mean(values: &[Decimal], span: usize) -> Option<Decimal> {
    if values.is_empty() || span == 0 {
        return None;
    }

    let alpha = Decimal::TWO / Decimal::from(span + 1);
    let decay = Decimal::ONE - alpha;

    let mut num = Decimal::ZERO;
    let mut den = Decimal::ZERO;
    for &x in values {
        num = x + decay * num;
        den = Decimal::ONE + decay * den;
    }
    Some(num / den)
}
