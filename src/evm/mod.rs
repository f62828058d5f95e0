//! EVM plumbing shared by the position manager.
//!
//! Provider construction, ERC-20 bindings and unit conversions. Everything
//! chain specific lives in [`crate::chains`].
//!
//! # Example
//!
//! ```no_run
//! use v3lp::evm::{self, ERC20};
//! use alloy::primitives::address;
//!
//! # async fn example() -> v3lp::Result<()> {
//! let provider = evm::connect("http://127.0.0.1:8545")?;
//! let token = ERC20::new(address!("0x1a6922a04b14b1560875d77a8c02ab3c0e354020"), provider);
//! let decimals = token.decimals().call().await?;
//! println!("{decimals} decimals");
//! # Ok(())
//! # }
//! ```

pub mod rpc;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::U256,
    providers::ProviderBuilder,
    signers::local::PrivateKeySigner,
    sol,
};
use rust_decimal::Decimal;
use url::Url;

use crate::error::{Error, Result};

/// Provider bound used throughout the crate.
///
/// Implemented by every Alloy provider for the Ethereum network.
pub trait Provider: alloy::providers::Provider<Ethereum> + Send + Sync + Clone + 'static {}

/// Type erased provider.
pub type DynProvider = alloy::providers::DynProvider<Ethereum>;

impl<T> Provider for T where
    T: alloy::providers::Provider<Ethereum> + Send + Sync + Clone + 'static
{
}

sol! {
    #[derive(Debug)]
    #[sol(rpc)]
    interface ERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        /// Faucet style mint exposed by the test tokens.
        function mint(uint256 amount) external;
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url.trim()).map_err(|err| Error::Config(format!("invalid rpc url {url:?}: {err}")))
}

/// Creates a read only provider.
///
/// The URL is validated here, no request is made until the first call.
pub fn connect(url: &str) -> Result<DynProvider> {
    let provider = ProviderBuilder::new().connect_http(parse_url(url)?);
    Ok(DynProvider::new(provider))
}

/// Creates a provider that signs transactions with `signer`.
pub fn connect_with_signer(url: &str, signer: PrivateKeySigner) -> Result<DynProvider> {
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(parse_url(url)?);
    Ok(DynProvider::new(provider))
}

/// Parses a hex encoded private key, with or without the `0x` prefix.
pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    private_key
        .trim()
        .parse()
        .map_err(|_| Error::Config("private key is not a valid secp256k1 key".into()))
}

/// Converts a decimal amount to raw token units.
///
/// # Example
///
/// ```
/// use v3lp::evm::to_wei;
/// use alloy::primitives::U256;
/// use rust_decimal::dec;
///
/// assert_eq!(to_wei(dec!(9.99), 6), U256::from(9_990_000));
/// ```
#[must_use]
#[inline]
pub fn to_wei(mut size: Decimal, decimals: u32) -> U256 {
    size.rescale(decimals);
    U256::from(size.mantissa().unsigned_abs())
}

/// Converts raw token units to a decimal amount.
///
/// Returns `None` when the amount doesn't fit in a [`Decimal`].
#[must_use]
#[inline]
pub fn from_wei(wei: U256, decimals: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(wei).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, decimals).ok()
}
