use crate::query::formatters::{OutputFormat, format_balances, format_events, format_stats};
use crate::repository::NftType;
use crate::storage::Storage;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use std::str::FromStr;

pub fn cmd_balances(storage: &dyn Storage, unsynced_only: bool, format: &OutputFormat) -> Result<()> {
    let balances = if unsynced_only {
        storage.non_synced_nft_balances()?
    } else {
        storage.nft_balances()?
    };

    println!("{}", format_balances(&balances, format));
    Ok(())
}

pub fn cmd_balance(
    storage: &dyn Storage,
    contract_address: &str,
    token_id: &str,
    format: &OutputFormat,
) -> Result<()> {
    let contract_address = Address::from_str(contract_address)
        .map_err(|_| anyhow::anyhow!("Invalid contract address format: {}", contract_address))?;
    let token_id = U256::from_str(token_id)
        .map_err(|_| anyhow::anyhow!("Invalid token id: {}", token_id))?;

    match storage.nft_balance(&contract_address, &token_id)? {
        Some(balance) => println!("{}", format_balances(&[balance], format)),
        None => println!("No balance record for {contract_address:?} #{token_id}."),
    }

    Ok(())
}

pub struct EventQuery {
    pub standard: String,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_events(storage: &dyn Storage, query: EventQuery, format: &OutputFormat) -> Result<()> {
    let nft_type = NftType::from_str(&query.standard)?;
    let events = storage.events(nft_type, query.limit, query.offset)?;

    println!("{}", format_events(&events, format));
    Ok(())
}

pub fn cmd_stats(storage: &dyn Storage, format: &OutputFormat) -> Result<()> {
    let stats = NftType::ALL
        .into_iter()
        .map(|nft_type| storage.event_stats(nft_type))
        .collect::<Result<Vec<_>>>()?;
    let balances = storage.nft_balances()?;

    println!("{}", format_stats(&stats, &balances, format));
    Ok(())
}

pub fn cmd_reset(storage: &dyn Storage) -> Result<()> {
    storage.clear()?;
    println!("All balances and events deleted.");
    Ok(())
}
