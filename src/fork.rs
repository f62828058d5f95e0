//! Funding a wallet on a local fork.
//!
//! The test tokens on the supported chains expose a `mint` restricted to a
//! known minter. On an anvil fork the minter can be impersonated, so the
//! wallet gets funded without holding the minter's key.

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, U256},
    providers::ext::AnvilApi,
    rpc::types::{TransactionReceipt, TransactionRequest},
    sol_types::SolCall,
};
use rust_decimal::Decimal;

use crate::{
    chains::ChainConfig,
    error::{Error, Result},
    evm::{self, ERC20, Provider, rpc},
    uniswap::{Client, position::Token},
};

/// Balances of one token before and after funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Funding {
    pub token: Token,
    pub before: U256,
    pub after: U256,
}

impl Funding {
    /// Balance after funding, in whole tokens.
    pub fn after_units(&self) -> Option<Decimal> {
        evm::from_wei(self.after, self.token.decimals.into())
    }
}

fn minter(chain: &ChainConfig, token: Token) -> Result<Address> {
    let minter = if token == chain.token_a {
        chain.minter_a
    } else {
        chain.minter_b
    };
    minter.ok_or_else(|| {
        Error::Config(format!(
            "chain {} has no known minter for {}",
            chain.chain_id, token.address
        ))
    })
}

impl<P> Client<P>
where
    P: Provider,
{
    async fn balance_of(&self, token: Address) -> Result<U256> {
        let contract = self.token(token);
        let contract = &contract;
        let owner = self.owner();
        self.read("balanceOf", move || async move {
            contract.balanceOf(owner).call().await.map_err(Error::from)
        })
        .await
    }

    /// Sends a call as `from`, an account the node holds unlocked.
    async fn send_unlocked<U: Provider>(
        &self,
        unlocked: &U,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<TransactionReceipt> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(calldata);
        rpc::send_and_confirm(unlocked, request, self.settings().rpc.timeout).await
    }

    /// Mints the chain's default amounts of both test tokens, moves them to
    /// the wallet and approves the position manager for the resulting
    /// balances.
    ///
    /// `unlocked` must be a provider without a wallet, so the minters'
    /// transactions go out as `eth_sendTransaction`. Only works against a
    /// node that supports `anvil_impersonateAccount`.
    pub async fn set_up_fork<U: Provider>(&self, unlocked: &U) -> Result<[Funding; 2]> {
        let chain = self.chain();
        let owner = self.owner();
        let (amount_a, amount_b) = chain.default_amounts();
        let legs = [(chain.token_a, amount_a), (chain.token_b, amount_b)];

        let minters = [minter(chain, chain.token_a)?, minter(chain, chain.token_b)?];
        for account in minters {
            unlocked.anvil_impersonate_account(account).await?;
            log::debug!("impersonating {account}");
        }

        let (before_a, before_b) = futures::try_join!(
            self.balance_of(chain.token_a.address),
            self.balance_of(chain.token_b.address)
        )?;
        log::info!("balances before funding: {before_a} / {before_b}");

        for ((token, amount), account) in legs.into_iter().zip(minters) {
            let mint = ERC20::mintCall { amount }.abi_encode();
            self.send_unlocked(unlocked, account, token.address, mint).await?;
            let transfer = ERC20::transferCall { to: owner, amount }.abi_encode();
            self.send_unlocked(unlocked, account, token.address, transfer).await?;
            log::debug!("moved {amount} of {} to {owner}", token.address);
        }

        for account in minters {
            unlocked.anvil_stop_impersonating_account(account).await?;
        }

        let (after_a, after_b) = futures::try_join!(
            self.balance_of(chain.token_a.address),
            self.balance_of(chain.token_b.address)
        )?;
        log::info!("balances after funding: {after_a} / {after_b}");

        self.approve(chain.token_a.address, chain.position_manager, after_a)
            .await?;
        self.approve(chain.token_b.address, chain.position_manager, after_b)
            .await?;

        Ok([
            Funding {
                token: chain.token_a,
                before: before_a,
                after: after_a,
            },
            Funding {
                token: chain.token_b,
                before: before_b,
                after: after_b,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{BSC, SEPOLIA};

    #[test]
    fn test_minter_lookup() {
        assert_eq!(
            minter(&SEPOLIA, SEPOLIA.token_a).unwrap(),
            SEPOLIA.minter_a.unwrap()
        );
        assert_eq!(
            minter(&BSC, BSC.token_b).unwrap(),
            BSC.minter_b.unwrap()
        );

        let mut chain = SEPOLIA;
        chain.minter_b = None;
        assert!(matches!(minter(&chain, chain.token_b), Err(Error::Config(_))));
    }

    #[test]
    fn test_funding_units() {
        let funding = Funding {
            token: SEPOLIA.token_a,
            before: U256::ZERO,
            after: U256::from(9_990_000_000_000u64),
        };
        assert_eq!(funding.after_units(), Some(rust_decimal::dec!(9990000)));
    }
}
