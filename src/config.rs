use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub owner_address: Address,
    pub database_url: String,
    /// Contracts to scan for transfers; empty means any contract.
    pub contract_addresses: Vec<Address>,
    pub start_block: u64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub log_batch_size: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls = std::env::var("JSON_RPC_URLS")
            .or_else(|_| std::env::var("JSON_RPC_URL"))
            .context("JSON_RPC_URLS (or JSON_RPC_URL) must be set in .env")?;
        let json_rpc_urls = split_list(&json_rpc_urls);

        let owner_address_str =
            std::env::var("OWNER_ADDRESS").context("OWNER_ADDRESS must be set in .env")?;
        let owner_address =
            Address::from_str(&owner_address_str).context("Invalid OWNER_ADDRESS format")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./nft-balances.db".to_string());

        let contract_addresses = match std::env::var("NFT_CONTRACT_ADDRESSES") {
            Ok(list) => split_list(&list)
                .iter()
                .map(|s| {
                    Address::from_str(s)
                        .with_context(|| format!("Invalid address in NFT_CONTRACT_ADDRESSES: {s}"))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            json_rpc_urls,
            owner_address,
            database_url,
            contract_addresses,
            start_block: parse_var("START_BLOCK", 0)?,
            poll_interval: Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 12)?),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 120)?),
            max_retries: parse_var("MAX_RETRIES", 5)?,
            log_batch_size: parse_var("LOG_BATCH_SIZE", 1000)?,
        })
    }

    /// Settings for tools that only touch the database.
    pub fn database_url_from_env() -> String {
        dotenv::dotenv().ok();
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./nft-balances.db".to_string())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name}: {value}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_lists() {
        assert_eq!(
            split_list("https://a.rpc, https://b.rpc,,"),
            vec!["https://a.rpc".to_string(), "https://b.rpc".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn missing_var_uses_default() {
        let value: u64 = parse_var("NFT_SYNC_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
