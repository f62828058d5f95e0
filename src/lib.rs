//! # v3lp
//!
//! Uniswap V3 liquidity position management for a single wallet.
//!
//! The crate sizes positions centered on the current pool price, builds the
//! position manager calldata to mint, withdraw, collect and reallocate them,
//! and reads back every position the wallet holds with its pool's prices.
//!
//! ## Quick Navigation
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chains`] | Supported networks, deployment addresses and default amounts |
//! | [`uniswap`] | The [`Client`] and the position operations |
//! | [`uniswap::math`] | Tick math and liquidity calculations |
//! | [`uniswap::position`] | Position sizing and the position read model |
//! | [`uniswap::tx`] | Calldata and transaction envelopes |
//! | [`evm`] | Providers, ERC-20 bindings, timeouts and retries |
//! | [`fork`] | Funding a wallet on a local anvil fork |
//! | [`error`] | Error taxonomy |
//!
//! ## Getting Started
//!
//! ```no_run
//! use v3lp::{Client, LiquidityRequest, Settings, chains, evm};
//!
//! #[tokio::main]
//! async fn main() -> v3lp::Result<()> {
//!     let chain = chains::lookup("11155111")?;
//!     let signer = evm::parse_signer("0x...")?;
//!     let client = Client::connect("http://127.0.0.1:8545", signer, chain, Settings::default())?;
//!
//!     let (amount_a, amount_b) = chain.default_amounts();
//!     let request =
//!         LiquidityRequest::new(chain.token_a, chain.token_b, amount_a, amount_b, chain.fee, 2)?;
//!     let receipt = client.add_liquidity(&request).await?;
//!     println!("minted in {}", receipt.transaction_hash);
//!
//!     for position in client.positions().await? {
//!         println!("{}: {:?}", position.token_id, position.price_range);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: submitted transactions and
//! their outcome at `info`, calldata and pool snapshots at `debug`, retried
//! reads and missing TWAPs at `warn`. Install any logger to see them.

pub mod chains;
pub mod error;
pub mod evm;
pub mod fork;
pub mod uniswap;
pub mod utils;

pub use chains::ChainConfig;
pub use error::{Error, Result};
pub use evm::DynProvider;
pub use uniswap::{
    Client, Settings,
    position::{FeeTier, LiquidityRequest, PositionInfo, Token},
};

/// Re-exported primitives from Alloy.
pub use alloy::primitives::{Address, U160, U256, address};
/// Re-exported decimal type from rust_decimal.
pub use rust_decimal::{Decimal, dec};
