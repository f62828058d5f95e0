//! Fixed point tick and liquidity math.
//!
//! Port of the Uniswap V3 `TickMath`, `SqrtPriceMath` and `LiquidityAmounts`
//! libraries, plus the periphery SDK helpers that size a mint with slippage
//! bounds. Intermediate products are computed in [`U512`] so nothing is
//! truncated before the final division.
//!
//! <https://github.com/Uniswap/v3-core/blob/main/contracts/libraries/TickMath.sol>

use alloy::primitives::{U256, U512};

use crate::error::MathError;

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// `sqrt_ratio_at_tick(MIN_TICK)`
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4_295_128_739, 0, 0, 0]);
/// `sqrt_ratio_at_tick(MAX_TICK)`
pub const MAX_SQRT_RATIO: U256 = U256::from_limbs([
    0x5d95_1d52_6398_8d26,
    0xefd1_fc6a_5064_8849,
    0x0000_0000_fffd_8963,
    0,
]);

pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Magic factors of `TickMath.getSqrtRatioAtTick`, one per bit of `|tick|`
/// starting at `0x2`.
const TICK_FACTORS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// Returns `sqrt(1.0001^tick) * 2^96`.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::from(1) << 128
    };
    for (bit, factor) in TICK_FACTORS.iter().enumerate() {
        if abs_tick & (0x2 << bit) != 0 {
            ratio = (ratio * U256::from(*factor)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // round up when going from Q128.128 to Q64.96
    let rounding = if ratio % (U256::from(1) << 32) == U256::ZERO {
        U256::ZERO
    } else {
        U256::from(1)
    };
    Ok((ratio >> 32) + rounding)
}

/// Rounds `tick` to the closest multiple of `tick_spacing` that is still
/// inside the valid tick range.
pub fn nearest_usable_tick(tick: i32, tick_spacing: i32) -> Result<i32, MathError> {
    if tick_spacing <= 0 {
        return Err(MathError::InvalidTickSpacing);
    }
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfBounds(tick));
    }
    // half-way values round towards positive infinity
    let rounded = (tick as f64 / tick_spacing as f64 + 0.5).floor() as i32 * tick_spacing;
    if rounded < MIN_TICK {
        Ok(rounded + tick_spacing)
    } else if rounded > MAX_TICK {
        Ok(rounded - tick_spacing)
    } else {
        Ok(rounded)
    }
}

fn narrow(value: U512) -> Result<U256, MathError> {
    if value > U512::from(U256::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from(value))
}

/// `floor(a * b / denominator)` without intermediate overflow.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(U512::from(a) * U512::from(b) / U512::from(denominator))
}

/// `ceil(a * b / denominator)` without intermediate overflow.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = U512::from(a) * U512::from(b);
    let denominator = U512::from(denominator);
    let mut result = product / denominator;
    if !(product % denominator).is_zero() {
        result += U512::from(1);
    }
    narrow(result)
}

fn sorted(a: U256, b: U256) -> (U256, U256) {
    if a > b { (b, a) } else { (a, b) }
}

fn to_liquidity(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.to::<u128>())
}

/// Liquidity provided by `amount0` between two prices, computed on the full
/// 512-bit product.
fn max_liquidity_for_amount0_precise(
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    let numerator = U512::from(amount0) * U512::from(sqrt_a) * U512::from(sqrt_b);
    let denominator = U512::from(Q96) * U512::from(sqrt_b - sqrt_a);
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(numerator / denominator)
}

/// Same as [`max_liquidity_for_amount0_precise`] but divides by `Q96` first,
/// which is what the on-chain router does.
fn max_liquidity_for_amount0_imprecise(
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    let intermediate = mul_div(sqrt_a, sqrt_b, Q96)?;
    mul_div(amount0, intermediate, sqrt_b - sqrt_a)
}

fn max_liquidity_for_amount1(
    sqrt_a: U256,
    sqrt_b: U256,
    amount1: U256,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    mul_div(amount1, Q96, sqrt_b - sqrt_a)
}

/// Maximum liquidity that `amount0` and `amount1` can provide between
/// `sqrt_a` and `sqrt_b` at the current price `sqrt_price`.
pub fn max_liquidity_for_amounts(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
    amount1: U256,
    use_full_precision: bool,
) -> Result<u128, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    let for_amount0: fn(U256, U256, U256) -> Result<U256, MathError> = if use_full_precision {
        max_liquidity_for_amount0_precise
    } else {
        max_liquidity_for_amount0_imprecise
    };

    let liquidity = if sqrt_price <= sqrt_a {
        for_amount0(sqrt_a, sqrt_b, amount0)?
    } else if sqrt_price < sqrt_b {
        let liquidity0 = for_amount0(sqrt_price, sqrt_b, amount0)?;
        let liquidity1 = max_liquidity_for_amount1(sqrt_a, sqrt_price, amount1)?;
        liquidity0.min(liquidity1)
    } else {
        max_liquidity_for_amount1(sqrt_a, sqrt_b, amount1)?
    };
    to_liquidity(liquidity)
}

/// Amount of token0 between two prices for a given liquidity.
pub fn amount0_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    if sqrt_a.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = sqrt_b - sqrt_a;

    if round_up {
        let inner = mul_div_rounding_up(numerator1, numerator2, sqrt_b)?;
        let mut amount = inner / sqrt_a;
        if !(inner % sqrt_a).is_zero() {
            amount += U256::from(1);
        }
        Ok(amount)
    } else {
        Ok(mul_div(numerator1, numerator2, sqrt_b)? / sqrt_a)
    }
}

/// Amount of token1 between two prices for a given liquidity.
pub fn amount1_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    if round_up {
        mul_div_rounding_up(U256::from(liquidity), sqrt_b - sqrt_a, Q96)
    } else {
        mul_div(U256::from(liquidity), sqrt_b - sqrt_a, Q96)
    }
}

/// Token amounts, rounded up, required to mint `liquidity` between
/// `tick_lower` and `tick_upper` when the pool trades at `sqrt_price`.
pub fn mint_amounts(
    sqrt_price: U256,
    liquidity: u128,
    tick_lower: i32,
    tick_upper: i32,
) -> Result<(U256, U256), MathError> {
    let sqrt_lower = sqrt_ratio_at_tick(tick_lower)?;
    let sqrt_upper = sqrt_ratio_at_tick(tick_upper)?;

    if sqrt_price < sqrt_lower {
        Ok((
            amount0_delta(sqrt_lower, sqrt_upper, liquidity, true)?,
            U256::ZERO,
        ))
    } else if sqrt_price < sqrt_upper {
        Ok((
            amount0_delta(sqrt_price, sqrt_upper, liquidity, true)?,
            amount1_delta(sqrt_lower, sqrt_price, liquidity, true)?,
        ))
    } else {
        Ok((
            U256::ZERO,
            amount1_delta(sqrt_lower, sqrt_upper, liquidity, true)?,
        ))
    }
}

/// Square root prices the pool may move to before a mint reverts, for a
/// slippage tolerance expressed in basis points.
///
/// Computes `sqrt(price * (1 ± slippage))` on the Q192 price, clamped to the
/// valid sqrt ratio range.
pub fn sqrt_ratios_after_slippage(
    sqrt_price: U256,
    slippage_bps: u32,
) -> Result<(U256, U256), MathError> {
    const BPS: u64 = 10_000;
    let slippage = u64::from(slippage_bps).min(BPS);
    let price_x192 = U512::from(sqrt_price) * U512::from(sqrt_price);

    let lower = narrow((price_x192 * U512::from(BPS - slippage) / U512::from(BPS)).root(2))?;
    let upper = narrow((price_x192 * U512::from(BPS + slippage) / U512::from(BPS)).root(2))?;

    let lower = if lower <= MIN_SQRT_RATIO {
        MIN_SQRT_RATIO + U256::from(1)
    } else {
        lower
    };
    let upper = if upper >= MAX_SQRT_RATIO {
        MAX_SQRT_RATIO - U256::from(1)
    } else {
        upper
    };
    Ok((lower, upper))
}

/// Minimum amounts that must be deposited for a mint to succeed when the
/// price moves by at most `slippage_bps` before execution.
///
/// The router derives the minted liquidity from the desired amounts with the
/// imprecise formula, so the same is done here before pricing that liquidity
/// on the two counterfactual pools. The lower amount of token0 is found at the
/// upper price and vice versa.
pub fn mint_amounts_with_slippage(
    sqrt_price: U256,
    liquidity: u128,
    tick_lower: i32,
    tick_upper: i32,
    slippage_bps: u32,
) -> Result<(U256, U256), MathError> {
    let (sqrt_price_lower, sqrt_price_upper) =
        sqrt_ratios_after_slippage(sqrt_price, slippage_bps)?;

    let (desired0, desired1) = mint_amounts(sqrt_price, liquidity, tick_lower, tick_upper)?;
    let will_be_created = max_liquidity_for_amounts(
        sqrt_price,
        sqrt_ratio_at_tick(tick_lower)?,
        sqrt_ratio_at_tick(tick_upper)?,
        desired0,
        desired1,
        false,
    )?;

    let (amount0, _) = mint_amounts(sqrt_price_upper, will_be_created, tick_lower, tick_upper)?;
    let (_, amount1) = mint_amounts(sqrt_price_lower, will_be_created, tick_lower, tick_upper)?;
    Ok((amount0, amount1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_ratio_at_tick_bounds() {
        assert_eq!(sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(sqrt_ratio_at_tick(0).unwrap(), Q96);
        assert_eq!(
            MAX_SQRT_RATIO.to_string(),
            "1461446703485210103287273052203988822378723970342"
        );
        assert_eq!(
            sqrt_ratio_at_tick(MIN_TICK - 1),
            Err(MathError::TickOutOfBounds(MIN_TICK - 1))
        );
        assert!(sqrt_ratio_at_tick(MAX_TICK + 1).is_err());
    }

    #[test]
    fn test_sqrt_ratio_is_monotonic() {
        let mut previous = sqrt_ratio_at_tick(-1_000).unwrap();
        for tick in (-990..=1_000).step_by(10) {
            let current = sqrt_ratio_at_tick(tick).unwrap();
            assert!(current > previous, "not increasing at {tick}");
            previous = current;
        }
    }

    #[test]
    fn test_sqrt_ratio_symmetry() {
        // sqrt(1.0001^t) * sqrt(1.0001^-t) == 1, so the product is ~2^192
        let up = sqrt_ratio_at_tick(50).unwrap();
        let down = sqrt_ratio_at_tick(-50).unwrap();
        let product = U512::from(up) * U512::from(down);
        let q192 = U512::from(Q96) * U512::from(Q96);
        let diff = if product > q192 {
            product - q192
        } else {
            q192 - product
        };
        assert!(diff < U512::from(1u128 << 100));
    }

    #[test]
    fn test_nearest_usable_tick() {
        let values = [
            (0, 10, 0),
            (5, 10, 10),
            (4, 10, 0),
            (-5, 10, 0),
            (-6, 10, -10),
            (-4, 10, 0),
            (-201_167, 10, -201_170),
            (127, 60, 120),
            (MIN_TICK, 60, -887_220),
            (MAX_TICK, 60, 887_220),
            (MAX_TICK, 1, MAX_TICK),
        ];
        for (index, (tick, spacing, expect)) in values.into_iter().enumerate() {
            assert_eq!(
                nearest_usable_tick(tick, spacing).unwrap(),
                expect,
                "failed at {index}"
            );
        }
        assert_eq!(
            nearest_usable_tick(0, 0),
            Err(MathError::InvalidTickSpacing)
        );
    }

    #[test]
    fn test_mul_div() {
        let max = U256::MAX;
        assert_eq!(mul_div(max, max, max).unwrap(), max);
        assert_eq!(
            mul_div(U256::from(7), U256::from(3), U256::from(2)).unwrap(),
            U256::from(10)
        );
        assert_eq!(
            mul_div_rounding_up(U256::from(7), U256::from(3), U256::from(2)).unwrap(),
            U256::from(11)
        );
        assert_eq!(
            mul_div_rounding_up(U256::from(6), U256::from(3), U256::from(2)).unwrap(),
            U256::from(9)
        );
        assert_eq!(
            mul_div(max, max, U256::from(1)),
            Err(MathError::Overflow)
        );
        assert_eq!(
            mul_div(U256::from(1), U256::from(1), U256::ZERO),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_amount_deltas_round() {
        let sqrt_a = sqrt_ratio_at_tick(-60).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(60).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;

        let down0 = amount0_delta(sqrt_a, sqrt_b, liquidity, false).unwrap();
        let up0 = amount0_delta(sqrt_a, sqrt_b, liquidity, true).unwrap();
        assert!(up0 >= down0 && up0 - down0 <= U256::from(1));

        let down1 = amount1_delta(sqrt_b, sqrt_a, liquidity, false).unwrap();
        let up1 = amount1_delta(sqrt_a, sqrt_b, liquidity, true).unwrap();
        assert!(up1 >= down1 && up1 - down1 <= U256::from(1));

        // symmetric range around price 1 needs roughly equal amounts
        let diff = if up0 > up1 { up0 - up1 } else { up1 - up0 };
        assert!(diff < up0 / U256::from(1_000));
    }

    #[test]
    fn test_mint_amounts_out_of_range() {
        let liquidity = 10_000_000u128;
        let below = sqrt_ratio_at_tick(-200).unwrap();
        let (amount0, amount1) = mint_amounts(below, liquidity, -100, 100).unwrap();
        assert!(amount0 > U256::ZERO);
        assert_eq!(amount1, U256::ZERO);

        let above = sqrt_ratio_at_tick(200).unwrap();
        let (amount0, amount1) = mint_amounts(above, liquidity, -100, 100).unwrap();
        assert_eq!(amount0, U256::ZERO);
        assert!(amount1 > U256::ZERO);
    }

    #[test]
    fn test_max_liquidity_roundtrip() {
        let sqrt_price = sqrt_ratio_at_tick(3).unwrap();
        let sqrt_a = sqrt_ratio_at_tick(-20).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(20).unwrap();
        let amount0 = U256::from(9_990_000_000_000u64);
        let amount1 = U256::from(10_500_090_000_000_000_000_000_000u128);

        let liquidity =
            max_liquidity_for_amounts(sqrt_price, sqrt_a, sqrt_b, amount0, amount1, true).unwrap();
        assert!(liquidity > 0);

        // the binding side is token0 here; minting the liquidity must not
        // require more than what was offered
        let (need0, need1) = mint_amounts(sqrt_price, liquidity, -20, 20).unwrap();
        assert!(need0 <= amount0);
        assert!(need1 <= amount1);
        assert!(amount0 - need0 <= U256::from(1));
    }

    #[test]
    fn test_precise_never_below_imprecise() {
        let sqrt_price = sqrt_ratio_at_tick(-12_345).unwrap();
        let sqrt_a = sqrt_ratio_at_tick(-12_400).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(-12_300).unwrap();
        let amount0 = U256::from(123_456_789_000u64);
        let amount1 = U256::from(987_654_321_000u64);

        let precise =
            max_liquidity_for_amounts(sqrt_price, sqrt_a, sqrt_b, amount0, amount1, true).unwrap();
        let imprecise =
            max_liquidity_for_amounts(sqrt_price, sqrt_a, sqrt_b, amount0, amount1, false).unwrap();
        assert!(precise >= imprecise);
    }

    #[test]
    fn test_slippage_bounds() {
        let sqrt_price = Q96;
        let (lower, upper) = sqrt_ratios_after_slippage(sqrt_price, 50).unwrap();
        assert!(lower < sqrt_price && sqrt_price < upper);

        let (lower, upper) = sqrt_ratios_after_slippage(MIN_SQRT_RATIO, 50).unwrap();
        assert_eq!(lower, MIN_SQRT_RATIO + U256::from(1));
        assert!(upper > MIN_SQRT_RATIO);

        let (_, upper) = sqrt_ratios_after_slippage(MAX_SQRT_RATIO - U256::from(1), 50).unwrap();
        assert_eq!(upper, MAX_SQRT_RATIO - U256::from(1));
    }

    #[test]
    fn test_mint_amounts_with_slippage_below_desired() {
        let sqrt_price = sqrt_ratio_at_tick(5).unwrap();
        let liquidity = 5_000_000_000_000_000u128;
        let (desired0, desired1) = mint_amounts(sqrt_price, liquidity, -20, 20).unwrap();
        let (min0, min1) = mint_amounts_with_slippage(sqrt_price, liquidity, -20, 20, 50).unwrap();
        assert!(min0 < desired0);
        assert!(min1 < desired1);

        let (exact0, exact1) =
            mint_amounts_with_slippage(sqrt_price, liquidity, -20, 20, 0).unwrap();
        assert!(exact0 <= desired0 && desired0 - exact0 <= U256::from(1));
        assert!(exact1 <= desired1 && desired1 - exact1 <= U256::from(1));
    }
}
