mod utils;

use std::{io::stdout, process::ExitCode, str::FromStr};

use alloy::primitives::U256;
use clap::{Args, Parser};
use enum_dispatch::enum_dispatch;
use log::LevelFilter;
use v3lp::{
    ChainConfig, Client, DynProvider, Error, LiquidityRequest, Settings, chains, evm,
};

/// Default range width, in tick spacings, for a new position.
const RANGE_COEFFICIENT: u32 = 2;
/// Default range width for the position opened by a reallocation.
const RANGE_COEFFICIENT_NEW: u32 = 3;

/// Manage Uniswap V3 liquidity positions of a single wallet.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// One of: positions, addLiquidity, withdrawLiquidity, reallocate,
    /// collectAllFees, setUp, pool
    command: String,
    #[command(flatten)]
    signer: SignerArgs,
    /// JSON-RPC endpoint.
    #[arg(short = 'r', long = "rpcUrl", env = "PROVIDER_RPC")]
    rpc_url: Option<String>,
    /// Chain id selecting deployment addresses and tokens.
    #[arg(short = 'c', long = "chain", env = "CHAIN_ID", default_value = "11155111")]
    chain: String,
    /// Position to act on, in the wallet's enumeration order. Defaults to the
    /// most recent one.
    #[arg(short = 'i', long = "positionIndex")]
    position_index: Option<usize>,
    /// Position NFT id for collectAllFees.
    #[arg(short = 't', long = "tokenId")]
    token_id: Option<U256>,
    /// Range half width in tick spacings.
    #[arg(long = "rangeCoefficient")]
    range_coefficient: Option<u32>,
    /// Print JSON instead of tables.
    #[arg(long)]
    json: bool,
    /// Log debug output, including calldata.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
pub struct SignerArgs {
    /// Hex encoded private key of the wallet.
    #[arg(short = 'p', long = "privateKey", env = "USER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    /// Foundry keystore name, looked up in ~/.foundry/keystores.
    #[arg(long)]
    pub keystore: Option<String>,
    /// Keystore password. Prompted for when missing.
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command {0}")]
struct UnknownCommand(String);

/// Everything a command needs once configuration is resolved.
struct Context {
    client: Client<DynProvider>,
    chain: &'static ChainConfig,
    rpc_url: String,
    position_index: Option<usize>,
    token_id: Option<U256>,
    range_coefficient: Option<u32>,
    json: bool,
}

impl Context {
    async fn position_index(&self) -> anyhow::Result<usize> {
        if let Some(index) = self.position_index {
            return Ok(index);
        }
        let count = self.client.position_count().await?;
        let index = count
            .checked_sub(1)
            .ok_or_else(|| Error::Validation("the wallet holds no positions".into()))?;
        log::info!("no position index given, using the most recent one ({index})");
        Ok(index)
    }

    fn request(
        &self,
        (amount_a, amount_b): (U256, U256),
        default_range: u32,
    ) -> v3lp::Result<LiquidityRequest> {
        LiquidityRequest::new(
            self.chain.token_a,
            self.chain.token_b,
            amount_a,
            amount_b,
            self.chain.fee,
            self.range_coefficient.unwrap_or(default_range),
        )
    }

    fn print_json<T: serde::Serialize>(&self, value: &T) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(stdout(), value)?;
        println!();
        Ok(())
    }

    fn print_receipt(&self, receipt: &alloy::rpc::types::TransactionReceipt) -> anyhow::Result<()> {
        if self.json {
            self.print_json(receipt)
        } else {
            utils::print_receipt(receipt)
        }
    }
}

#[enum_dispatch]
trait Run {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[enum_dispatch(Run)]
enum Command {
    Positions(PositionsCmd),
    AddLiquidity(AddLiquidityCmd),
    WithdrawLiquidity(WithdrawLiquidityCmd),
    Reallocate(ReallocateCmd),
    CollectAllFees(CollectAllFeesCmd),
    SetUp(SetUpCmd),
    Pool(PoolCmd),
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "positions" => PositionsCmd.into(),
            "addLiquidity" | "add-liquidity" => AddLiquidityCmd.into(),
            "withdrawLiquidity" | "withdraw-liquidity" => WithdrawLiquidityCmd.into(),
            "reallocate" => ReallocateCmd.into(),
            "collectAllFees" | "collect-all-fees" => CollectAllFeesCmd.into(),
            "setUp" | "set-up" => SetUpCmd.into(),
            "pool" => PoolCmd.into(),
            other => return Err(UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }
}

struct PositionsCmd;

impl Run for PositionsCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let positions = ctx.client.positions().await?;
        log::info!("{} positions", positions.len());
        if ctx.json {
            ctx.print_json(&positions)
        } else {
            utils::print_positions(&positions)
        }
    }
}

struct AddLiquidityCmd;

impl Run for AddLiquidityCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let request = ctx.request(ctx.chain.default_amounts(), RANGE_COEFFICIENT)?;
        let receipt = ctx.client.add_liquidity(&request).await?;
        ctx.print_receipt(&receipt)
    }
}

struct WithdrawLiquidityCmd;

impl Run for WithdrawLiquidityCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let index = ctx.position_index().await?;
        let receipt = ctx.client.withdraw_liquidity(index).await?;
        ctx.print_receipt(&receipt)
    }
}

struct ReallocateCmd;

impl Run for ReallocateCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let request = ctx.request(ctx.chain.default_amounts_new(), RANGE_COEFFICIENT_NEW)?;
        let index = ctx.position_index().await?;
        let receipt = ctx.client.reallocate(index, &request).await?;
        ctx.print_receipt(&receipt)
    }
}

struct CollectAllFeesCmd;

impl Run for CollectAllFeesCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let token_id = match ctx.token_id {
            Some(token_id) => token_id,
            None => {
                let index = ctx.position_index().await?;
                ctx.client.resolve_position(index).await?
            }
        };
        let receipt = ctx.client.collect_all_fees(token_id).await?;
        ctx.print_receipt(&receipt)
    }
}

struct SetUpCmd;

impl Run for SetUpCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let unlocked = evm::connect(&ctx.rpc_url)?;
        let funding = ctx.client.set_up_fork(&unlocked).await?;
        if ctx.json {
            let value: Vec<_> = funding
                .iter()
                .map(|leg| {
                    serde_json::json!({
                        "token": leg.token.address,
                        "before": leg.before.to_string(),
                        "after": leg.after.to_string(),
                    })
                })
                .collect();
            ctx.print_json(&value)
        } else {
            utils::print_funding(&funding)
        }
    }
}

struct PoolCmd;

impl Run for PoolCmd {
    async fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        let chain = ctx.chain;
        let summary = ctx
            .client
            .pool_summary(chain.token_a.address, chain.token_b.address, chain.fee)
            .await?;
        if ctx.json {
            ctx.print_json(&summary)
        } else {
            println!("pool\t{}", summary.state.address);
            println!("tick\t{}", summary.state.tick);
            println!("liquidity\t{}", summary.state.liquidity);
            println!("price\t{}", v3lp::utils::display_or_unknown(summary.current_price));
            println!("TWAP\t{}", v3lp::utils::display_or_unknown(summary.twap));
            Ok(())
        }
    }
}

/// Process exit status for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.is::<UnknownCommand>() {
        64
    } else if let Some(err) = err.downcast_ref::<Error>() {
        err.exit_code()
    } else {
        1
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command: Command = cli.command.parse()?;
    let chain = chains::lookup(&cli.chain)?;
    let rpc_url = cli
        .rpc_url
        .ok_or_else(|| Error::Config("no rpc url: set PROVIDER_RPC or pass --rpcUrl".into()))?;
    let signer = utils::find_signer(&cli.signer)?;
    log::debug!("wallet {} on chain {}", signer.address(), chain.chain_id);

    let ctx = Context {
        client: Client::connect(&rpc_url, signer, chain, Settings::default())?,
        chain,
        rpc_url,
        position_index: cli.position_index,
        token_id: cli.token_id,
        range_coefficient: cli.range_coefficient,
        json: cli.json,
    };
    command.run(&ctx).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("v3lp", level)
        .with_module_level("v3lpcli", level)
        .env()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        for name in [
            "positions",
            "addLiquidity",
            "withdrawLiquidity",
            "reallocate",
            "collectAllFees",
            "setUp",
            "pool",
            "add-liquidity",
        ] {
            assert!(name.parse::<Command>().is_ok(), "{name}");
        }
        assert!("mint".parse::<Command>().is_err());
        assert!("Positions".parse::<Command>().is_err());
    }

    #[test]
    fn test_exit_codes() {
        let unknown = anyhow::Error::from(UnknownCommand("mint".into()));
        assert_eq!(exit_code(&unknown), 64);

        let config = anyhow::Error::from(Error::Config("missing".into()));
        assert_eq!(exit_code(&config), 78);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&other), 1);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "v3lp",
            "withdrawLiquidity",
            "-p",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            "-r",
            "http://127.0.0.1:8545",
            "-c",
            "56",
            "-i",
            "2",
            "--rangeCoefficient",
            "4",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.command, "withdrawLiquidity");
        assert_eq!(cli.chain, "56");
        assert_eq!(cli.position_index, Some(2));
        assert_eq!(cli.range_coefficient, Some(4));
        assert!(cli.json);
    }
}
