//! Signer loading and output helpers.

use std::{
    env::home_dir,
    io::{Write, stdout},
};

use alloy::{rpc::types::TransactionReceipt, signers::local::PrivateKeySigner};
use v3lp::{Error, evm, fork::Funding, uniswap::position::PositionInfo, utils::display_or_unknown};

use crate::SignerArgs;

/// Loads the wallet signer.
///
/// Attempts, in order:
/// 1. Private key (`--privateKey` or `USER_PRIVATE_KEY`)
/// 2. Foundry keystore (`--keystore`), prompting for the password if needed
pub fn find_signer(args: &SignerArgs) -> anyhow::Result<PrivateKeySigner> {
    if let Some(key) = args.private_key.as_deref() {
        Ok(evm::parse_signer(key)?)
    } else if let Some(filename) = args.keystore.as_ref() {
        let home_dir = home_dir()
            .ok_or_else(|| Error::Config("unable to locate home dir".into()))?;
        let keypath = home_dir.join(".foundry").join("keystores").join(filename);
        let password = args
            .password
            .clone()
            .or_else(|| {
                rpassword::prompt_password(format!("{} password: ", keypath.display())).ok()
            })
            .ok_or_else(|| Error::Config("keystores require a password".into()))?;
        let signer = PrivateKeySigner::decrypt_keystore(&keypath, password)
            .map_err(|err| Error::Config(format!("unable to open {}: {err}", keypath.display())))?;
        Ok(signer)
    } else {
        Err(Error::Config("no signer: set USER_PRIVATE_KEY or pass --privateKey".into()).into())
    }
}

pub fn print_positions(positions: &[PositionInfo]) -> anyhow::Result<()> {
    let mut writer = tabwriter::TabWriter::new(stdout());

    writeln!(
        &mut writer,
        "token id\ttoken0\ttoken1\tfee\tticks\tliquidity\towed0\towed1\tprice range\tcurrent\tTWAP\tactive"
    )?;
    for position in positions {
        writeln!(
            &mut writer,
            "{}\t{}\t{}\t{}\t[{}, {}]\t{}\t{}\t{}\t[{}, {}]\t{}\t{}\t{}",
            position.token_id,
            position.token0,
            position.token1,
            position.fee,
            position.tick_lower,
            position.tick_upper,
            position.liquidity,
            position.tokens_owed0,
            position.tokens_owed1,
            display_or_unknown(position.price_range[0]),
            display_or_unknown(position.price_range[1]),
            display_or_unknown(position.current_price),
            display_or_unknown(position.twap),
            position.is_active(),
        )?;
    }

    writer.flush()?;
    Ok(())
}

pub fn print_receipt(receipt: &TransactionReceipt) -> anyhow::Result<()> {
    let mut writer = tabwriter::TabWriter::new(stdout());
    writeln!(&mut writer, "transaction\t{}", receipt.transaction_hash)?;
    writeln!(
        &mut writer,
        "block\t{}",
        receipt.block_number.unwrap_or_default()
    )?;
    writeln!(&mut writer, "gas used\t{}", receipt.gas_used)?;
    writer.flush()?;
    Ok(())
}

pub fn print_funding(funding: &[Funding]) -> anyhow::Result<()> {
    let mut writer = tabwriter::TabWriter::new(stdout());
    writeln!(&mut writer, "token\tbefore\tafter\tafter (units)")?;
    for leg in funding {
        writeln!(
            &mut writer,
            "{}\t{}\t{}\t{}",
            leg.token.address,
            leg.before,
            leg.after,
            display_or_unknown(leg.after_units()),
        )?;
    }
    writer.flush()?;
    Ok(())
}
