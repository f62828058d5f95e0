//! Pool addressing and on chain pool reads.

use alloy::{
    primitives::{Address, B256, U160, U256, keccak256},
    sol_types::SolValue,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    error::{Error, Result},
    evm::Provider,
    uniswap::{
        Client,
        position::{FeeTier, price_from_tick},
    },
    utils::{serialize_address_as_hex, serialize_price},
};

/// Snapshot of a pool's price and active liquidity.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    #[serde(serialize_with = "serialize_address_as_hex")]
    pub address: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub sqrt_price_x96: U160,
    #[serde_as(as = "DisplayFromStr")]
    pub liquidity: u128,
    pub tick: i32,
}

impl PoolState {
    /// Price of token0 at the current tick.
    pub fn price(&self) -> Option<Decimal> {
        price_from_tick(self.tick)
    }
}

/// Pool summary printed by the `pool` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    #[serde(flatten)]
    pub state: PoolState,
    #[serde(serialize_with = "serialize_price")]
    pub current_price: Option<Decimal>,
    #[serde(rename = "TWAP", serialize_with = "serialize_price")]
    pub twap: Option<Decimal>,
}

/// Orders two token addresses the way pools store them.
#[inline]
pub fn sort_tokens(token_a: Address, token_b: Address) -> (Address, Address) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// Deterministic CREATE2 address of the pool for a pair and fee tier.
///
/// The order of `token_a` and `token_b` doesn't matter.
pub fn compute_pool_address(
    factory: Address,
    token_a: Address,
    token_b: Address,
    fee: FeeTier,
    init_code_hash: B256,
) -> Address {
    let (token0, token1) = sort_tokens(token_a, token_b);
    let salt = keccak256((token0, token1, U256::from(fee.pips())).abi_encode());
    factory.create2(salt, init_code_hash)
}

/// Average tick over a window from two tick cumulatives, oldest first.
///
/// Integer division truncates toward zero.
pub fn average_tick(tick_cumulatives: &[i64], window: u32) -> Option<i32> {
    match tick_cumulatives {
        [then, now] if window > 0 => {
            let average = now.checked_sub(*then)? / i64::from(window);
            i32::try_from(average).ok()
        }
        _ => None,
    }
}

impl<P> Client<P>
where
    P: Provider,
{
    /// Address of the pool for `token_a`/`token_b` at `fee` on this chain.
    pub fn pool_address(&self, token_a: Address, token_b: Address, fee: FeeTier) -> Address {
        compute_pool_address(
            self.chain.factory,
            token_a,
            token_b,
            fee,
            self.chain.pool_init_code_hash,
        )
    }

    /// Reads the current state of the pool for a pair.
    ///
    /// Fails with [`Error::PoolNotFound`] when nothing is deployed at the
    /// derived address.
    pub async fn pool_state(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
    ) -> Result<PoolState> {
        let address = self.pool_address(token_a, token_b, fee);
        let provider = &self.provider;
        let code = self
            .read("getCode", move || async move {
                provider.get_code_at(address).await.map_err(Error::from)
            })
            .await?;
        if code.is_empty() {
            return Err(Error::PoolNotFound(address));
        }
        self.pool_state_at(address).await
    }

    /// Reads `slot0` and the active liquidity of the pool at `address`.
    pub async fn pool_state_at(&self, address: Address) -> Result<PoolState> {
        let pool = self.pool(address);
        let pool = &pool;
        let (liquidity, slot0) = self
            .read("pool state", move || async move {
                futures::try_join!(
                    async { pool.liquidity().call().await },
                    async { pool.slot0().call().await },
                )
                .map_err(Error::from)
            })
            .await?;

        let state = PoolState {
            address,
            sqrt_price_x96: slot0.sqrtPriceX96,
            liquidity,
            tick: slot0.tick.as_i32(),
        };
        log::debug!("pool {address}: tick {} liquidity {}", state.tick, state.liquidity);
        Ok(state)
    }

    /// Price of token0 at the pool's current tick.
    pub async fn current_price(&self, pool: Address) -> Result<Option<Decimal>> {
        Ok(self.pool_state_at(pool).await?.price())
    }

    /// Time weighted average price over the configured window.
    ///
    /// Returns `None` when the pool can't answer, typically because its
    /// oracle doesn't reach that far back.
    pub async fn twap(&self, pool: Address) -> Option<Decimal> {
        let window = self.settings.twap_window;
        let contract = self.pool(pool);
        let contract = &contract;
        let observed = self
            .read("observe", move || async move {
                contract
                    .observe(vec![window, 0])
                    .call()
                    .await
                    .map_err(Error::from)
            })
            .await;

        let cumulatives = match observed {
            Ok(observed) => observed
                .tickCumulatives
                .iter()
                .map(|tick| tick.as_i64())
                .collect::<Vec<_>>(),
            Err(err) => {
                log::warn!("no twap for pool {pool}: {err}");
                return None;
            }
        };
        average_tick(&cumulatives, window).and_then(price_from_tick)
    }

    /// Current state, price and TWAP of the pool for a pair.
    pub async fn pool_summary(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
    ) -> Result<PoolSummary> {
        let state = self.pool_state(token_a, token_b, fee).await?;
        let twap = self.twap(state.address).await;
        Ok(PoolSummary {
            state,
            current_price: state.price(),
            twap,
        })
    }
}
