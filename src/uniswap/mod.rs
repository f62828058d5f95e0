//! Uniswap V3 position management.
//!
//! [`Client`] owns a provider, the chain's deployment addresses and the
//! wallet address, and exposes the operations the command line runs: listing
//! positions, minting, withdrawing, collecting fees and reallocating.
//!
//! The pure parts live in submodules so they can be tested without a node:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`math`] | Tick math, liquidity and amount calculations |
//! | [`position`] | Requests, position sizing and price formatting |
//! | [`pool`] | Pool addressing and pool reads |
//! | [`tx`] | Calldata and transaction envelopes |
//! | [`contracts`] | Contract bindings |
//!
//! # Example
//!
//! ```no_run
//! use v3lp::{chains, uniswap::{Client, Settings}};
//!
//! # async fn example() -> v3lp::Result<()> {
//! let signer = v3lp::evm::parse_signer("0x...")?;
//! let chain = chains::lookup("11155111")?;
//! let client = Client::connect("http://127.0.0.1:8545", signer, chain, Settings::default())?;
//!
//! for position in client.positions().await? {
//!     println!("{} [{}, {}]", position.token_id, position.tick_lower, position.tick_upper);
//! }
//! # Ok(())
//! # }
//! ```

pub mod contracts;
pub mod math;
pub mod pool;
pub mod position;
pub mod tx;

use std::{
    collections::{HashMap, hash_map::Entry},
    future::Future,
};

use alloy::{
    primitives::{Address, Bytes, U256},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use futures::future::{join_all, try_join_all};
use rust_decimal::Decimal;

use crate::{
    chains::ChainConfig,
    error::{Error, Result},
    evm::{
        self, DynProvider, ERC20, Provider,
        rpc::{self, RpcSettings},
    },
    uniswap::{
        contracts::{
            INonfungiblePositionManager::{
                self, INonfungiblePositionManagerInstance, positionsReturn,
            },
            IUniswapV3Pool::{self, IUniswapV3PoolInstance},
        },
        position::{FeeTier, LiquidityRequest, PositionInfo, build_position, price_from_tick},
        tx::TxSettings,
    },
    utils::display_or_unknown,
};

/// Seconds of history averaged by [`Client::twap`].
pub const TWAP_WINDOW: u32 = 10;

/// Tunables for a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub tx: TxSettings,
    pub rpc: RpcSettings,
    /// TWAP window in seconds.
    pub twap_window: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tx: TxSettings::default(),
            rpc: RpcSettings::default(),
            twap_window: TWAP_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PoolPrices {
    tick: Option<i32>,
    current: Option<Decimal>,
    twap: Option<Decimal>,
}

/// Position manager client for one wallet on one chain.
pub struct Client<P>
where
    P: Provider,
{
    provider: P,
    chain: &'static ChainConfig,
    owner: Address,
    settings: Settings,
}

impl Client<DynProvider> {
    /// Creates a client that signs with `signer` over HTTP.
    pub fn connect(
        url: &str,
        signer: PrivateKeySigner,
        chain: &'static ChainConfig,
        settings: Settings,
    ) -> Result<Self> {
        let owner = signer.address();
        let provider = evm::connect_with_signer(url, signer)?;
        Ok(Self::new(provider, chain, owner, settings))
    }
}

impl<P> Client<P>
where
    P: Provider,
{
    /// Creates a client from a provider able to send transactions from
    /// `owner`.
    pub fn new(
        provider: P,
        chain: &'static ChainConfig,
        owner: Address,
        settings: Settings,
    ) -> Self {
        Self {
            provider,
            chain,
            owner,
            settings,
        }
    }

    /// Returns the root provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn chain(&self) -> &'static ChainConfig {
        self.chain
    }

    /// Wallet whose positions are managed.
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the non-fungible position manager.
    pub fn position_manager(&self) -> INonfungiblePositionManagerInstance<P> {
        INonfungiblePositionManager::new(self.chain.position_manager, self.provider.clone())
    }

    /// Returns the pool at `address`.
    pub fn pool(&self, address: Address) -> IUniswapV3PoolInstance<P> {
        IUniswapV3Pool::new(address, self.provider.clone())
    }

    /// Returns the ERC-20 token at `address`.
    pub fn token(&self, address: Address) -> ERC20::ERC20Instance<P> {
        ERC20::new(address, self.provider.clone())
    }

    pub(crate) async fn read<T, F, Fut>(&self, what: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        rpc::read(&self.settings.rpc, what, call).await
    }

    /// Number of positions held by the wallet.
    pub async fn position_count(&self) -> Result<usize> {
        let npm = self.position_manager();
        let npm = &npm;
        let owner = self.owner;
        let balance = self
            .read("balanceOf", move || async move {
                npm.balanceOf(owner).call().await.map_err(Error::from)
            })
            .await?;
        Ok(balance.saturating_to::<usize>())
    }

    /// Token id of the wallet's position at `index`, in enumeration order.
    pub async fn token_id_at(&self, index: usize) -> Result<U256> {
        let npm = self.position_manager();
        let npm = &npm;
        let owner = self.owner;
        self.read("tokenOfOwnerByIndex", move || async move {
            npm.tokenOfOwnerByIndex(owner, U256::from(index))
                .call()
                .await
                .map_err(Error::from)
        })
        .await
    }

    /// Token id at `index`, checked against the number of positions held.
    pub async fn resolve_position(&self, index: usize) -> Result<U256> {
        let count = self.position_count().await?;
        if index >= count {
            return Err(Error::Validation(format!(
                "position index {index} is out of range, the wallet holds {count} positions"
            )));
        }
        self.token_id_at(index).await
    }

    /// Raw position manager record for `token_id`.
    pub async fn position(&self, token_id: U256) -> Result<positionsReturn> {
        let npm = self.position_manager();
        let npm = &npm;
        self.read("positions", move || async move {
            npm.positions(token_id).call().await.map_err(Error::from)
        })
        .await
    }

    /// Decimals of the token at `address`.
    pub async fn decimals(&self, address: Address) -> Result<u8> {
        let token = self.token(address);
        let token = &token;
        self.read("decimals", move || async move {
            token.decimals().call().await.map_err(Error::from)
        })
        .await
    }

    /// Every position held by the wallet, in enumeration order, with prices
    /// from its pool.
    ///
    /// Pools are read once per call however many positions share them. Prices
    /// a pool can't report are unknown rather than failing the listing.
    pub async fn positions(&self) -> Result<Vec<PositionInfo>> {
        let count = self.position_count().await?;
        let token_ids = try_join_all((0..count).map(|index| self.token_id_at(index))).await?;
        let records =
            try_join_all(token_ids.iter().map(|&token_id| self.position(token_id))).await?;

        let mut pools: HashMap<Address, PoolPrices> = HashMap::default();
        let mut pending = vec![];
        for address in records.iter().filter_map(|record| self.record_pool(record)) {
            if let Entry::Vacant(entry) = pools.entry(address) {
                entry.insert(PoolPrices::default());
                pending.push(address);
            }
        }
        let prices = join_all(pending.iter().map(|&address| self.pool_prices(address))).await;
        pools.extend(pending.into_iter().zip(prices));

        let positions = token_ids
            .into_iter()
            .zip(records)
            .map(|(token_id, record)| {
                let prices = self
                    .record_pool(&record)
                    .and_then(|address| pools.get(&address).copied())
                    .unwrap_or_default();
                let tick_lower = record.tickLower.as_i32();
                let tick_upper = record.tickUpper.as_i32();
                PositionInfo {
                    token_id,
                    tick_lower,
                    tick_upper,
                    token0: record.token0,
                    token1: record.token1,
                    fee: record.fee.to::<u32>(),
                    liquidity: record.liquidity,
                    fee_growth_inside0_last_x128: record.feeGrowthInside0LastX128,
                    fee_growth_inside1_last_x128: record.feeGrowthInside1LastX128,
                    tokens_owed0: record.tokensOwed0,
                    tokens_owed1: record.tokensOwed1,
                    current_tick: prices.tick,
                    twap: prices.twap,
                    current_price: prices.current,
                    price_range: [price_from_tick(tick_lower), price_from_tick(tick_upper)],
                }
            })
            .collect();
        Ok(positions)
    }

    fn record_pool(&self, record: &positionsReturn) -> Option<Address> {
        let fee = FeeTier::try_from(record.fee.to::<u32>()).ok()?;
        Some(self.pool_address(record.token0, record.token1, fee))
    }

    /// Prices of the pool at `address`, each one unknown when it can't be
    /// read.
    async fn pool_prices(&self, address: Address) -> PoolPrices {
        let (state, twap) = futures::join!(self.pool_state_at(address), self.twap(address));
        match state {
            Ok(state) => PoolPrices {
                tick: Some(state.tick),
                current: state.price(),
                twap,
            },
            Err(err) => {
                log::warn!("no price for pool {address}: {err}");
                PoolPrices {
                    twap,
                    ..PoolPrices::default()
                }
            }
        }
    }

    /// Mints a new position sized from `request`, centered on the current
    /// pool price.
    pub async fn add_liquidity(&self, request: &LiquidityRequest) -> Result<TransactionReceipt> {
        let state = self
            .pool_state(request.token_a().address, request.token_b().address, request.fee())
            .await?;
        let position = build_position(&state, request)?;
        log::info!(
            "minting [{}, {}] with {} token0 and {} token1",
            position.tick_lower,
            position.tick_upper,
            position.amount0,
            position.amount1
        );

        let request = tx::build_mint(
            &position,
            U256::from(state.sqrt_price_x96),
            self.owner,
            self.chain.position_manager,
            &self.settings.tx,
        )?;
        self.submit("addLiquidity", request).await
    }

    /// Removes all liquidity from the position at `index`.
    ///
    /// The withdrawn tokens stay owed to the position until collected.
    pub async fn withdraw_liquidity(&self, index: usize) -> Result<TransactionReceipt> {
        let token_id = self.resolve_position(index).await?;
        let record = self.position(token_id).await?;
        if record.liquidity == 0 {
            return Err(Error::Validation(format!(
                "position {token_id} has no liquidity to withdraw"
            )));
        }
        log::info!("withdrawing {} liquidity from position {token_id}", record.liquidity);

        let call = tx::decrease_call(token_id, record.liquidity, self.settings.tx.deadline());
        let request = self.envelope(self.chain.position_manager, call.abi_encode().into());
        self.submit("withdrawLiquidity", request).await
    }

    /// Collects every token owed to position `token_id` into the wallet.
    pub async fn collect_all_fees(&self, token_id: U256) -> Result<TransactionReceipt> {
        let record = self.position(token_id).await?;
        if record.tokensOwed0 == 0 && record.tokensOwed1 == 0 {
            return Err(Error::Validation(format!(
                "position {token_id} has nothing to collect"
            )));
        }

        let (decimals0, decimals1) =
            futures::try_join!(self.decimals(record.token0), self.decimals(record.token1))?;
        log::info!(
            "collecting {} of {} and {} of {} from position {token_id}",
            display_or_unknown(evm::from_wei(U256::from(record.tokensOwed0), decimals0.into())),
            record.token0,
            display_or_unknown(evm::from_wei(U256::from(record.tokensOwed1), decimals1.into())),
            record.token1,
        );

        let call = tx::collect_call(token_id, self.owner, record.tokensOwed0, record.tokensOwed1);
        let request = self.envelope(self.chain.position_manager, call.abi_encode().into());
        self.submit("collectAllFees", request).await
    }

    /// Closes the position at `index` and opens a new one sized from
    /// `request`, in a single transaction.
    ///
    /// The position manager is approved for the new amounts first. The batch
    /// then removes the old liquidity, collects everything owed and mints.
    pub async fn reallocate(
        &self,
        index: usize,
        request: &LiquidityRequest,
    ) -> Result<TransactionReceipt> {
        let token_id = self.resolve_position(index).await?;
        let record = self.position(token_id).await?;
        let deadline = self.settings.tx.deadline();

        let mut calls: Vec<Bytes> = Vec::with_capacity(3);
        if record.liquidity > 0 {
            calls.push(tx::decrease_call(token_id, record.liquidity, deadline).abi_encode().into());
        }
        let sweep = tx::collect_call(token_id, self.owner, u128::MAX, u128::MAX);
        calls.push(sweep.abi_encode().into());

        let state = self
            .pool_state(request.token_a().address, request.token_b().address, request.fee())
            .await?;
        let position = build_position(&state, request)?;
        let mint = tx::mint_call(
            &position,
            U256::from(state.sqrt_price_x96),
            self.owner,
            deadline,
            self.settings.tx.slippage_bps,
        )?;
        calls.push(mint.abi_encode().into());

        log::info!(
            "moving position {token_id} from [{}, {}] to [{}, {}]",
            record.tickLower,
            record.tickUpper,
            position.tick_lower,
            position.tick_upper
        );
        for (token, amount) in [
            (position.token0.address, position.amount0),
            (position.token1.address, position.amount1),
        ] {
            self.approve(token, self.chain.position_manager, amount).await?;
        }

        let request = self.envelope(self.chain.position_manager, tx::multicall(calls));
        self.submit("reallocate", request).await
    }

    /// Sets the allowance of `spender` over the wallet's `token` to `amount`.
    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TransactionReceipt> {
        let call = ERC20::approveCall { spender, amount };
        self.submit("approve", self.envelope(token, call.abi_encode().into()))
            .await
    }

    /// Wraps calldata for `to` in the wallet's transaction envelope.
    fn envelope(&self, to: Address, calldata: Bytes) -> TransactionRequest {
        tx::envelope(calldata, to, self.owner, &self.settings.tx)
    }

    /// Sends a transaction from the wallet and waits for the receipt.
    ///
    /// Submission is never retried. A receipt with a failed status is an
    /// error.
    async fn submit(&self, what: &str, request: TransactionRequest) -> Result<TransactionReceipt> {
        if let Some(input) = request.input.input() {
            log::debug!("{what}: calldata {}", const_hex::encode_prefixed(input));
        }
        match rpc::send_and_confirm(&self.provider, request, self.settings.rpc.timeout).await {
            Ok(receipt) => {
                log::info!(
                    "{what}: {} confirmed in block {}",
                    receipt.transaction_hash,
                    receipt.block_number.unwrap_or_default()
                );
                Ok(receipt)
            }
            Err(err) => {
                log::error!("{what}: {err}");
                Err(err)
            }
        }
    }
}
