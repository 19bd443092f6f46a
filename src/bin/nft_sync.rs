use anyhow::Result;
use nft_balance_sync::NftKit;
use nft_balance_sync::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting NFT balance sync");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Owner address: {:?}", config.owner_address);
    if config.contract_addresses.is_empty() {
        info!("Scanning transfers on any contract");
    } else {
        info!("Scanning {} contract(s)", config.contract_addresses.len());
    }

    let kit = NftKit::from_config(&config)?;

    let mut balances = kit.subscribe();
    tokio::spawn(async move {
        while balances.changed().await.is_ok() {
            let current = balances.borrow_and_update().clone();
            let synced = current.iter().filter(|b| b.synced).count();
            let owned = current.iter().filter(|b| b.balance > 0).count();
            info!(
                "Balances updated: {} tokens tracked, {} synced, {} owned",
                current.len(),
                synced,
                owned
            );
        }
    });

    if let Err(e) = kit.run(config.poll_interval).await {
        error!("Sync error: {}", e);
        return Err(e);
    }

    Ok(())
}
