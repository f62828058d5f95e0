//! Static chain registry.
//!
//! Every supported network is described by a [`ChainConfig`] that is known at
//! compile time. Lookups are by chain id string, the same string the command
//! line accepts with `--chain`.

use alloy::primitives::{Address, B256, U256, address, b256};

use crate::{
    error::{Error, Result},
    uniswap::position::{FeeTier, Token},
};

/// Init code hash of the canonical Uniswap V3 pool contract.
pub const POOL_INIT_CODE_HASH: B256 =
    b256!("0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");

/// Per-chain deployment addresses and default amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// Chain id, used as the registry key.
    pub chain_id: &'static str,
    /// UniswapV3Factory contract address
    pub factory: Address,
    /// NonfungiblePositionManager contract address
    pub position_manager: Address,
    /// Init code hash used to derive pool addresses.
    pub pool_init_code_hash: B256,
    pub token_a: Token,
    pub token_b: Token,
    pub fee: FeeTier,
    /// Amounts, in the smallest unit of each token, used by `addLiquidity`.
    pub default_amount_a: u128,
    pub default_amount_b: u128,
    /// Amounts used for the new position minted by `reallocate`.
    pub default_amount_a_new: u128,
    pub default_amount_b_new: u128,
    /// Accounts allowed to mint the test tokens on a fork.
    pub minter_a: Option<Address>,
    pub minter_b: Option<Address>,
}

impl ChainConfig {
    /// Default amounts for a fresh position as `(amount_a, amount_b)`.
    pub fn default_amounts(&self) -> (U256, U256) {
        (
            U256::from(self.default_amount_a),
            U256::from(self.default_amount_b),
        )
    }

    /// Default amounts for the position minted by a reallocation.
    pub fn default_amounts_new(&self) -> (U256, U256) {
        (
            U256::from(self.default_amount_a_new),
            U256::from(self.default_amount_b_new),
        )
    }
}

/// Sepolia testnet.
pub const SEPOLIA: ChainConfig = ChainConfig {
    chain_id: "11155111",
    factory: address!("0x1f2FCf1d036b375b384012e61D3AA33F8C256bbE"),
    position_manager: address!("0x544bA588efD839d2692Fc31EA991cD39993c135F"),
    pool_init_code_hash: POOL_INIT_CODE_HASH,
    token_a: Token::new(address!("0x1a6922a04b14b1560875d77a8c02ab3c0e354020"), 6),
    token_b: Token::new(address!("0x59e3a6011631de8e5302e5138d7eb3006e607b75"), 18),
    fee: FeeTier::Low,
    default_amount_a: 9_990_000_000_000,
    default_amount_b: 10_500_090_000_000_000_000_000_000,
    default_amount_a_new: 9_890_000_000_000,
    default_amount_b_new: 10_000_090_000_000_000_000_000_000,
    minter_a: Some(address!("0x55Dc5ce95849273F522Fe914D3fa035d9E380d4A")),
    minter_b: Some(address!("0x55Dc5ce95849273F522Fe914D3fa035d9E380d4A")),
};

/// BNB Smart Chain.
pub const BSC: ChainConfig = ChainConfig {
    chain_id: "56",
    factory: address!("0x126555dd55a39328F69400d6aE4F782Bd4C34ABb"),
    position_manager: address!("0xF70c086618dcf2b1A461311275e00D6B722ef914"),
    pool_init_code_hash: POOL_INIT_CODE_HASH,
    token_a: Token::new(address!("0x1a6922a04b14b1560875d77a8c02ab3c0e354020"), 18),
    token_b: Token::new(address!("0x59e3a6011631de8e5302e5138d7eb3006e607b75"), 18),
    fee: FeeTier::Low,
    default_amount_a: 9_990_000_000_000,
    default_amount_b: 10_500_090_000_000_000_000_000_000,
    default_amount_a_new: 9_890_000_000_000,
    default_amount_b_new: 10_000_090_000_000_000_000_000_000,
    minter_a: Some(address!("0x55Dc5ce95849273F522Fe914D3fa035d9E380d4A")),
    minter_b: Some(address!("0x55Dc5ce95849273F522Fe914D3fa035d9E380d4A")),
};

/// All known chains.
pub const CHAINS: [&ChainConfig; 2] = [&SEPOLIA, &BSC];

/// Looks up a chain by id.
///
/// # Example
///
/// ```
/// use v3lp::chains;
///
/// let sepolia = chains::lookup("11155111").unwrap();
/// assert_eq!(sepolia.fee.tick_spacing(), 10);
/// assert!(chains::lookup("1").is_err());
/// ```
pub fn lookup(chain_id: &str) -> Result<&'static ChainConfig> {
    let chain_id = chain_id.trim();
    CHAINS
        .into_iter()
        .find(|chain| chain.chain_id == chain_id)
        .ok_or_else(|| Error::UnknownChain(chain_id.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("11155111").unwrap(), &SEPOLIA);
        assert_eq!(lookup("56").unwrap(), &BSC);
        assert_eq!(lookup(" 56 ").unwrap().chain_id, "56");
    }

    #[test]
    fn test_unknown_chain_fails_closed() {
        let err = lookup("137").unwrap_err();
        assert!(matches!(err, Error::UnknownChain(id) if id == "137"));
        assert!(lookup("").is_err());
    }

    #[test]
    fn test_chain_ids_are_unique() {
        let ids: HashSet<_> = CHAINS.iter().map(|chain| chain.chain_id).collect();
        assert_eq!(ids.len(), CHAINS.len());
    }

    #[test]
    fn test_default_amounts() {
        let (a, b) = SEPOLIA.default_amounts();
        assert_eq!(a, U256::from(9_990_000_000_000u64));
        assert_eq!(b.to_string(), "10500090000000000000000000");
        let (a, _) = SEPOLIA.default_amounts_new();
        assert_eq!(a, U256::from(9_890_000_000_000u64));
    }
}
