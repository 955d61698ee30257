//! Integer arithmetic on base units. Every balance-affecting computation goes
//! through these helpers; `Decimal` is reserved for percentages and display.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub const BPS_DENOMINATOR: u32 = 10_000;

/// `floor(a * b / c)` with a 256-bit intermediate product.
/// Returns `None` when `c == 0` or the quotient does not fit in `u128`.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / c);
    }

    let (hi, lo) = wide_mul(a, b);
    if hi >= c {
        return None;
    }

    // Restoring long division of (hi, lo) by c; the remainder stays below c.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Some(quotient)
}

fn wide_mul(a: u128, b: u128) -> (u128, u128) {
    let mask = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & mask);
    let (b_hi, b_lo) = (b >> 64, b & mask);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & mask) + (hl & mask);
    let lo = (ll & mask) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// `amount × bps / 10_000`, rounded down.
pub fn apply_bps(amount: u128, bps: u32) -> u128 {
    mul_div(amount, bps as u128, BPS_DENOMINATOR as u128).unwrap_or(u128::MAX)
}

/// `part` expressed in basis points of `whole`, saturating at `u32::MAX`.
pub fn bps_of(part: u128, whole: u128) -> u32 {
    if whole == 0 {
        return if part == 0 { 0 } else { u32::MAX };
    }
    mul_div(part, BPS_DENOMINATOR as u128, whole)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(u32::MAX)
}

/// Scale a signed quantity measured against `from` so it is measured against `to`.
pub fn scale_signed(value: i128, from: u128, to: u128) -> i128 {
    let magnitude = mul_div(value.unsigned_abs(), to, from).unwrap_or(0);
    let magnitude = i128::try_from(magnitude).unwrap_or(i128::MAX);
    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Signed difference `a - b` of two unsigned amounts.
pub fn signed_diff(a: u128, b: u128) -> i128 {
    if a >= b {
        i128::try_from(a - b).unwrap_or(i128::MAX)
    } else {
        -i128::try_from(b - a).unwrap_or(i128::MAX)
    }
}

/// Apply a signed delta to an unsigned amount. `None` if the result would be negative.
pub fn checked_apply(amount: u128, delta: i128) -> Option<u128> {
    if delta >= 0 {
        amount.checked_add(delta.unsigned_abs())
    } else {
        amount.checked_sub(delta.unsigned_abs())
    }
}

/// Convert a percentage (`5` meaning 5 %) into basis points.
pub fn pct_to_bps(pct: Decimal) -> Option<u32> {
    if pct.is_sign_negative() {
        return None;
    }
    (pct * Decimal::ONE_HUNDRED).round().to_u32()
}
