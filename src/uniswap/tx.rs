//! Calldata and transaction envelopes for the position manager.
//!
//! Nothing here touches the network: every function is a pure mapping from a
//! sized position or a position id to bytes the position manager accepts.

use std::time::Duration;

use alloy::{
    network::TransactionBuilder,
    primitives::{
        Address, Bytes, U256,
        aliases::{I24, U24},
    },
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};

use crate::{
    error::Result,
    uniswap::{
        contracts::INonfungiblePositionManager::{
            CollectParams, DecreaseLiquidityParams, MintParams, collectCall, decreaseLiquidityCall,
            mintCall, multicallCall,
        },
        math,
        position::Position,
    },
};

/// Fee caps, deadline and slippage applied to every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSettings {
    /// EIP-1559 fee cap, in wei.
    pub max_fee_per_gas: u128,
    /// EIP-1559 tip cap, in wei.
    pub max_priority_fee_per_gas: u128,
    /// How long a submitted transaction stays valid.
    pub deadline: Duration,
    /// Price slippage tolerated when minting, in basis points.
    pub slippage_bps: u32,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            max_fee_per_gas: 250_000_000_000,
            max_priority_fee_per_gas: 250_000_000_000,
            deadline: Duration::from_secs(1_200),
            slippage_bps: 50,
        }
    }
}

impl TxSettings {
    /// Deadline, in unix seconds, for a transaction built at `now`.
    pub fn deadline_from(&self, now: u64) -> U256 {
        U256::from(now.saturating_add(self.deadline.as_secs()))
    }

    /// Deadline for a transaction built right now.
    pub fn deadline(&self) -> U256 {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        self.deadline_from(now)
    }
}

/// `mint` call for a sized position.
///
/// Desired amounts are the position's amounts. Minimum amounts are what the
/// same liquidity needs if the price moves by the configured slippage.
pub fn mint_call(
    position: &Position,
    sqrt_price_x96: U256,
    recipient: Address,
    deadline: U256,
    slippage_bps: u32,
) -> Result<mintCall> {
    let (amount0_min, amount1_min) = math::mint_amounts_with_slippage(
        sqrt_price_x96,
        position.liquidity,
        position.tick_lower,
        position.tick_upper,
        slippage_bps,
    )?;

    Ok(mintCall {
        params: MintParams {
            token0: position.token0.address,
            token1: position.token1.address,
            fee: U24::from(position.fee.pips()),
            tickLower: I24::unchecked_from(position.tick_lower),
            tickUpper: I24::unchecked_from(position.tick_upper),
            amount0Desired: position.amount0,
            amount1Desired: position.amount1,
            amount0Min: amount0_min,
            amount1Min: amount1_min,
            recipient,
            deadline,
        },
    })
}

/// Mint transaction for a sized position, sent by and minting to
/// `recipient`.
///
/// The deadline is [`TxSettings::deadline`] from now.
pub fn build_mint(
    position: &Position,
    sqrt_price_x96: U256,
    recipient: Address,
    position_manager: Address,
    settings: &TxSettings,
) -> Result<TransactionRequest> {
    let call = mint_call(
        position,
        sqrt_price_x96,
        recipient,
        settings.deadline(),
        settings.slippage_bps,
    )?;
    Ok(envelope(call.abi_encode().into(), position_manager, recipient, settings))
}

/// `decreaseLiquidity` call removing `liquidity` with no minimum amounts.
pub fn decrease_call(token_id: U256, liquidity: u128, deadline: U256) -> decreaseLiquidityCall {
    decreaseLiquidityCall {
        params: DecreaseLiquidityParams {
            tokenId: token_id,
            liquidity,
            amount0Min: U256::ZERO,
            amount1Min: U256::ZERO,
            deadline,
        },
    }
}

pub fn collect_call(
    token_id: U256,
    recipient: Address,
    amount0_max: u128,
    amount1_max: u128,
) -> collectCall {
    collectCall {
        params: CollectParams {
            tokenId: token_id,
            recipient,
            amount0Max: amount0_max,
            amount1Max: amount1_max,
        },
    }
}

/// Batches calls into one `multicall`. A single call is sent as is.
pub fn multicall(calls: Vec<Bytes>) -> Bytes {
    if let [single] = calls.as_slice() {
        return single.clone();
    }
    multicallCall { data: calls }.abi_encode().into()
}

/// Wraps calldata for `to` into a zero value EIP-1559 request from `from`.
pub fn envelope(
    calldata: Bytes,
    to: Address,
    from: Address,
    settings: &TxSettings,
) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_input(calldata)
        .with_value(U256::ZERO)
        .with_max_fee_per_gas(settings.max_fee_per_gas)
        .with_max_priority_fee_per_gas(settings.max_priority_fee_per_gas)
}
