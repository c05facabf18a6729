//! Fixed-point amount conversion.
//!
//! Chain balances are integers in the smallest unit. Everything additive
//! happens on [`RawAmount`]; [`to_display_units`] is applied once, at the end.

use rust_decimal::Decimal;

/// Amount in the chain's smallest unit.
pub type RawAmount = u128;

/// Decimal places of the native token.
pub const DEFAULT_DECIMALS: u32 = 10;

/// Largest fractional scale `Decimal` can carry.
const MAX_SCALE: u32 = 28;

/// Largest mantissa `Decimal` can carry (2^96 - 1).
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// Convert a raw integer amount to display units.
///
/// Total: values that exceed `Decimal`'s 96-bit mantissa shed low-order
/// fractional digits (rounded half-up) and saturate at `Decimal::MAX` when no
/// fractional digits remain.
pub fn to_display_units(raw: RawAmount, decimals: u32) -> Decimal {
    let mut mantissa = raw;
    let mut scale = decimals;

    while scale > MAX_SCALE || mantissa > MAX_MANTISSA {
        if scale == 0 {
            return Decimal::MAX;
        }
        let round_up = mantissa % 10 >= 5;
        mantissa = mantissa / 10 + u128::from(round_up);
        scale -= 1;
    }

    Decimal::from_i128_with_scale(mantissa as i128, scale)
}

/// Convert a display value back to raw units, truncating below the smallest unit.
///
/// Negative inputs map to zero; results beyond `u128` saturate.
pub fn from_display_units(value: Decimal, decimals: u32) -> RawAmount {
    if value.is_sign_negative() {
        return 0;
    }

    let mantissa = value.mantissa().unsigned_abs();
    let scale = value.scale();

    if decimals >= scale {
        match 10u128.checked_pow(decimals - scale) {
            Some(factor) => mantissa.saturating_mul(factor),
            None if mantissa == 0 => 0,
            None => u128::MAX,
        }
    } else {
        match 10u128.checked_pow(scale - decimals) {
            Some(factor) => mantissa / factor,
            None => 0,
        }
    }
}

/// Display-scale `end - start`, with the subtraction done on raw integers.
pub fn delta_to_display_units(start: RawAmount, end: RawAmount, decimals: u32) -> Decimal {
    if end >= start {
        to_display_units(end - start, decimals)
    } else {
        -to_display_units(start - end, decimals)
    }
}

/// Overflow-checked sum of raw amounts.
pub fn checked_sum<I>(amounts: I) -> Option<RawAmount>
where
    I: IntoIterator<Item = RawAmount>,
{
    amounts
        .into_iter()
        .try_fold(0u128, |acc, amount| acc.checked_add(amount))
}

/// Convert a whole number of display units (e.g. a configured supply constant) to raw.
pub fn whole_units_to_raw(units: u64, decimals: u32) -> RawAmount {
    from_display_units(Decimal::from(units), decimals)
}
