//! Liquidity requests, position sizing and the position read model.

use alloy::primitives::{Address, U256};
use rust_decimal::{Decimal, MathematicalOps, dec};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    error::{Error, Result},
    uniswap::{
        math::{self, MAX_TICK, MIN_TICK},
        pool::PoolState,
    },
    utils::{serialize_address_as_hex, serialize_price, serialize_price_range},
};

/// Base of the tick price grid: `price = 1.0001^tick`.
pub const TICK_BASE: Decimal = dec!(1.0001);

/// Number of decimal digits kept when displaying prices.
pub const PRICE_PRECISION: u32 = 3;

/// An ERC-20 token taking part in a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
}

impl Token {
    pub const fn new(address: Address, decimals: u8) -> Self {
        Self { address, decimals }
    }

    /// Whether this token is `token0` of a pool it shares with `other`.
    pub fn sorts_before(&self, other: &Token) -> bool {
        self.address < other.address
    }
}

/// Uniswap V3 fee tiers.
///
/// Each tier is bound to the tick spacing the factory enables it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FeeTier {
    #[display("0.01%")]
    Lowest,
    #[display("0.05%")]
    Low,
    #[display("0.3%")]
    Medium,
    #[display("1%")]
    High,
}

impl FeeTier {
    /// Fee in hundredths of a basis point, as stored on chain.
    pub const fn pips(self) -> u32 {
        match self {
            FeeTier::Lowest => 100,
            FeeTier::Low => 500,
            FeeTier::Medium => 3_000,
            FeeTier::High => 10_000,
        }
    }

    pub const fn tick_spacing(self) -> i32 {
        match self {
            FeeTier::Lowest => 1,
            FeeTier::Low => 10,
            FeeTier::Medium => 60,
            FeeTier::High => 200,
        }
    }
}

impl TryFrom<u32> for FeeTier {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            100 => Ok(FeeTier::Lowest),
            500 => Ok(FeeTier::Low),
            3_000 => Ok(FeeTier::Medium),
            10_000 => Ok(FeeTier::High),
            other => Err(Error::Validation(format!("unsupported fee tier {other}"))),
        }
    }
}

/// Everything needed to size a new position.
///
/// Amounts are raw token units. Once built the request can't be changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityRequest {
    token_a: Token,
    token_b: Token,
    amount_a: U256,
    amount_b: U256,
    fee: FeeTier,
    range_coefficient: u32,
}

impl LiquidityRequest {
    pub fn new(
        token_a: Token,
        token_b: Token,
        amount_a: U256,
        amount_b: U256,
        fee: FeeTier,
        range_coefficient: u32,
    ) -> Result<Self> {
        if token_a.address == token_b.address {
            return Err(Error::Validation(format!(
                "both legs use token {}",
                token_a.address
            )));
        }
        if range_coefficient == 0 {
            return Err(Error::Validation(
                "range coefficient must be at least 1".into(),
            ));
        }
        if amount_a.is_zero() && amount_b.is_zero() {
            return Err(Error::Validation("both amounts are zero".into()));
        }
        Ok(Self {
            token_a,
            token_b,
            amount_a,
            amount_b,
            fee,
            range_coefficient,
        })
    }

    pub fn token_a(&self) -> Token {
        self.token_a
    }

    pub fn token_b(&self) -> Token {
        self.token_b
    }

    pub fn amount_a(&self) -> U256 {
        self.amount_a
    }

    pub fn amount_b(&self) -> U256 {
        self.amount_b
    }

    pub fn fee(&self) -> FeeTier {
        self.fee
    }

    pub fn range_coefficient(&self) -> u32 {
        self.range_coefficient
    }

    /// Tokens and amounts in pool order: `(token0, token1, amount0, amount1)`.
    pub fn sorted(&self) -> (Token, Token, U256, U256) {
        if self.token_a.sorts_before(&self.token_b) {
            (self.token_a, self.token_b, self.amount_a, self.amount_b)
        } else {
            (self.token_b, self.token_a, self.amount_b, self.amount_a)
        }
    }
}

/// A position sized against a pool snapshot, ready to be minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub token0: Token,
    pub token1: Token,
    pub fee: FeeTier,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    /// Token0 needed at the snapshot price, rounded up.
    pub amount0: U256,
    /// Token1 needed at the snapshot price, rounded up.
    pub amount1: U256,
}

/// Tick range centered on the pool's current tick.
///
/// Returns `(tick_lower, tick_upper)` where both bounds sit
/// `range_coefficient * tick_spacing` away from the usable tick closest to
/// `current_tick`.
pub fn symmetric_range(
    current_tick: i32,
    fee: FeeTier,
    range_coefficient: u32,
) -> Result<(i32, i32)> {
    let spacing = fee.tick_spacing();
    let center = math::nearest_usable_tick(current_tick, spacing)?;
    let out_of_bounds = || {
        Error::Validation(format!(
            "range coefficient {range_coefficient} exceeds the tick bounds"
        ))
    };
    let width = i32::try_from(range_coefficient)
        .ok()
        .and_then(|coefficient| coefficient.checked_mul(spacing))
        .ok_or_else(out_of_bounds)?;

    let tick_lower = center.checked_sub(width).ok_or_else(out_of_bounds)?;
    let tick_upper = center.checked_add(width).ok_or_else(out_of_bounds)?;
    if tick_lower < MIN_TICK || tick_upper > MAX_TICK {
        return Err(Error::Validation(format!(
            "range [{tick_lower}, {tick_upper}] exceeds the tick bounds"
        )));
    }
    Ok((tick_lower, tick_upper))
}

/// Sizes the largest position the requested amounts can fund, in a range
/// symmetric around the current price.
pub fn build_position(pool: &PoolState, request: &LiquidityRequest) -> Result<Position> {
    let (tick_lower, tick_upper) =
        symmetric_range(pool.tick, request.fee, request.range_coefficient)?;
    let (token0, token1, amount0, amount1) = request.sorted();

    let sqrt_price = U256::from(pool.sqrt_price_x96);
    let liquidity = math::max_liquidity_for_amounts(
        sqrt_price,
        math::sqrt_ratio_at_tick(tick_lower)?,
        math::sqrt_ratio_at_tick(tick_upper)?,
        amount0,
        amount1,
        true,
    )?;
    if liquidity == 0 {
        return Err(Error::Validation(
            "amounts are too small to mint any liquidity".into(),
        ));
    }

    let (amount0, amount1) = math::mint_amounts(sqrt_price, liquidity, tick_lower, tick_upper)?;
    log::debug!(
        "position [{tick_lower}, {tick_upper}] liquidity {liquidity} amounts {amount0} / {amount1}"
    );

    Ok(Position {
        token0,
        token1,
        fee: request.fee,
        tick_lower,
        tick_upper,
        liquidity,
        amount0,
        amount1,
    })
}

/// Price of token0 for a tick, `1.0001^-tick`, with [`PRICE_PRECISION`]
/// decimals.
///
/// Returns `None` when the price doesn't fit in a [`Decimal`].
///
/// # Example
///
/// ```
/// use v3lp::uniswap::position::price_from_tick;
/// use rust_decimal::dec;
///
/// assert_eq!(price_from_tick(0), Some(dec!(1.000)));
/// assert_eq!(price_from_tick(-10), Some(dec!(1.001)));
/// ```
#[must_use]
pub fn price_from_tick(tick: i32) -> Option<Decimal> {
    let exponent = -i64::from(tick);
    let price = if exponent >= 0 {
        TICK_BASE.checked_powi(exponent)?
    } else {
        // tiny prices round to zero
        TICK_BASE
            .checked_powi(-exponent)
            .and_then(|denominator| Decimal::ONE.checked_div(denominator))
            .unwrap_or(Decimal::ZERO)
    };
    let mut price = price.round_dp(PRICE_PRECISION);
    price.rescale(PRICE_PRECISION);
    Some(price)
}

/// A position owned by the wallet, as read from the position manager and
/// enriched with its pool's prices.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    /// NFT token ID for this position
    #[serde_as(as = "DisplayFromStr")]
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    #[serde(serialize_with = "serialize_address_as_hex")]
    pub token0: Address,
    #[serde(serialize_with = "serialize_address_as_hex")]
    pub token1: Address,
    /// Fee tier in hundredths of a basis point.
    pub fee: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub liquidity: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub fee_growth_inside0_last_x128: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub fee_growth_inside1_last_x128: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub tokens_owed0: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub tokens_owed1: u128,
    /// Pool tick at the time of the read.
    pub current_tick: Option<i32>,
    #[serde(rename = "TWAP", serialize_with = "serialize_price")]
    pub twap: Option<Decimal>,
    #[serde(serialize_with = "serialize_price")]
    pub current_price: Option<Decimal>,
    /// Prices at `tick_lower` and `tick_upper`.
    #[serde(serialize_with = "serialize_price_range")]
    pub price_range: [Option<Decimal>; 2],
}

impl PositionInfo {
    /// Whether the pool currently trades inside the position's range.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current_tick
            .is_some_and(|tick| tick >= self.tick_lower && tick < self.tick_upper)
    }

    /// Whether the position still holds liquidity or uncollected tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.liquidity == 0 && self.tokens_owed0 == 0 && self.tokens_owed1 == 0
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{U160, address};

    use super::*;
    use crate::chains::SEPOLIA;

    fn request(range_coefficient: u32) -> LiquidityRequest {
        let (amount_a, amount_b) = SEPOLIA.default_amounts();
        LiquidityRequest::new(
            SEPOLIA.token_a,
            SEPOLIA.token_b,
            amount_a,
            amount_b,
            SEPOLIA.fee,
            range_coefficient,
        )
        .unwrap()
    }

    fn pool_at(tick: i32) -> PoolState {
        PoolState {
            address: Address::ZERO,
            sqrt_price_x96: U160::from(math::sqrt_ratio_at_tick(tick).unwrap()),
            liquidity: 1_000_000_000_000_000_000,
            tick,
        }
    }

    #[test]
    fn test_fee_tiers() {
        for fee in [100u32, 500, 3_000, 10_000] {
            assert_eq!(FeeTier::try_from(fee).unwrap().pips(), fee);
        }
        assert!(matches!(FeeTier::try_from(2_500), Err(Error::Validation(_))));
        assert_eq!(FeeTier::Low.to_string(), "0.05%");
        assert_eq!(FeeTier::High.tick_spacing(), 200);
    }

    #[test]
    fn test_request_validation() {
        let token = SEPOLIA.token_a;
        let one = U256::from(1);
        assert!(LiquidityRequest::new(token, token, one, one, FeeTier::Low, 2).is_err());
        assert!(
            LiquidityRequest::new(token, SEPOLIA.token_b, one, one, FeeTier::Low, 0).is_err()
        );
        assert!(
            LiquidityRequest::new(token, SEPOLIA.token_b, U256::ZERO, U256::ZERO, FeeTier::Low, 1)
                .is_err()
        );
    }

    #[test]
    fn test_sorted_follows_addresses() {
        let low = Token::new(address!("0x0000000000000000000000000000000000000001"), 6);
        let high = Token::new(address!("0x0000000000000000000000000000000000000002"), 18);
        let req = LiquidityRequest::new(high, low, U256::from(7), U256::from(9), FeeTier::Low, 1)
            .unwrap();
        let (token0, token1, amount0, amount1) = req.sorted();
        assert_eq!(token0, low);
        assert_eq!(token1, high);
        assert_eq!(amount0, U256::from(9));
        assert_eq!(amount1, U256::from(7));
    }

    #[test]
    fn test_range_symmetry() {
        for (tick, fee, coefficient) in [
            (0, FeeTier::Low, 2),
            (-201_167, FeeTier::Low, 2),
            (12_345, FeeTier::Medium, 3),
            (-7, FeeTier::High, 1),
            (887_000, FeeTier::Lowest, 5),
        ] {
            let spacing = fee.tick_spacing();
            let center = math::nearest_usable_tick(tick, spacing).unwrap();
            let (lower, upper) = symmetric_range(tick, fee, coefficient).unwrap();
            let width = coefficient as i32 * spacing;
            assert_eq!(upper - center, width);
            assert_eq!(center - lower, width);
            assert_eq!(lower % spacing, 0);
            assert_eq!(upper % spacing, 0);
        }
    }

    #[test]
    fn test_range_outside_bounds() {
        let err = symmetric_range(MAX_TICK - 5, FeeTier::Medium, 10).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // width still fits in an i32 but the bounds don't
        for (tick, coefficient) in [(-100, 214_748_364), (100, 214_748_364), (0, u32::MAX)] {
            let err = symmetric_range(tick, FeeTier::Low, coefficient).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{tick} {coefficient}");
        }
    }

    #[test]
    fn test_build_position() {
        let pool = pool_at(-3);
        let position = build_position(&pool, &request(2)).unwrap();
        assert_eq!(position.tick_lower, -20);
        assert_eq!(position.tick_upper, 20);
        assert_eq!(position.token0, SEPOLIA.token_a);
        assert!(position.liquidity > 0);

        let (amount_a, amount_b) = SEPOLIA.default_amounts();
        assert!(position.amount0 <= amount_a);
        assert!(position.amount1 <= amount_b);
        assert!(position.amount0 > U256::ZERO && position.amount1 > U256::ZERO);
    }

    #[test]
    fn test_build_position_is_deterministic() {
        let pool = pool_at(1_234);
        let first = build_position(&pool, &request(3)).unwrap();
        let second = build_position(&pool, &request(3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_price_from_tick() {
        let values = [
            (0, dec!(1.000)),
            (-10, dec!(1.001)),
            (10, dec!(0.999)),
            (6_932, dec!(0.500)),
            (-6_932, dec!(2.000)),
            (400_000, dec!(0.000)),
        ];
        for (index, (tick, expect)) in values.into_iter().enumerate() {
            assert_eq!(price_from_tick(tick), Some(expect), "failed at {index}");
        }
        assert_eq!(price_from_tick(0).unwrap().to_string(), "1.000");
        assert_eq!(price_from_tick(MIN_TICK), None);
    }

    #[test]
    fn test_position_info_serialization() {
        let info = PositionInfo {
            token_id: U256::from(42),
            tick_lower: -20,
            tick_upper: 20,
            token0: SEPOLIA.token_a.address,
            token1: SEPOLIA.token_b.address,
            fee: 500,
            liquidity: u128::MAX,
            fee_growth_inside0_last_x128: U256::MAX,
            fee_growth_inside1_last_x128: U256::ZERO,
            tokens_owed0: 1,
            tokens_owed1: 0,
            current_tick: Some(-3),
            twap: None,
            current_price: price_from_tick(-3),
            price_range: [price_from_tick(-20), None],
        };
        assert!(info.is_active());
        assert!(!info.is_empty());

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["tokenId"], "42");
        assert_eq!(value["liquidity"], u128::MAX.to_string());
        assert_eq!(value["feeGrowthInside0LastX128"], U256::MAX.to_string());
        assert_eq!(value["tokensOwed0"], "1");
        assert_eq!(value["TWAP"], "unknown");
        assert_eq!(value["currentPrice"], "1.000");
        assert_eq!(value["priceRange"][0], "1.002");
        assert_eq!(value["priceRange"][1], "unknown");
        assert_eq!(value["tickLower"], -20);
    }
}
