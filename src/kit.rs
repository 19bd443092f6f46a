use crate::balance_manager::BalanceManager;
use crate::config::Config;
use crate::discovery::{EventLogProvider, TransactionSyncer};
use crate::log_provider::RpcEventProvider;
use crate::probe::{BalanceProbe, LedgerClient};
use crate::repository::{ChainTransaction, Database, NftBalance, NftType};
use crate::rpc::RpcClient;
use crate::storage::Storage;
use crate::sync_manager::BalanceSyncManager;
use crate::transactions::{self, TransactionData};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Sync state of the underlying chain client, as reported by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSyncState {
    Synced,
    Syncing,
    NotSynced(String),
}

/// Wires discovery, the balance cache and the sync coordinator together and
/// owns their lifetimes.
pub struct NftKit {
    owner: Address,
    storage: Arc<dyn Storage>,
    balance_manager: Arc<BalanceManager>,
    sync_manager: Arc<BalanceSyncManager>,
    syncers: Vec<TransactionSyncer>,
    chain_state: Mutex<ChainSyncState>,
    listener: JoinHandle<()>,
}

impl NftKit {
    pub fn new(
        owner: Address,
        storage: Arc<dyn Storage>,
        ledger_client: Arc<dyn LedgerClient>,
        event_provider: Arc<dyn EventLogProvider>,
    ) -> Self {
        let probe = BalanceProbe::new(ledger_client, owner);
        let sync_manager = Arc::new(BalanceSyncManager::new(storage.clone(), probe));
        let balance_manager = Arc::new(BalanceManager::new(storage.clone(), sync_manager.clone()));

        let observer = Arc::downgrade(&balance_manager);
        sync_manager.set_observer(observer);

        let (tx, rx) = mpsc::unbounded_channel();
        let syncers = NftType::ALL
            .into_iter()
            .map(|nft_type| {
                TransactionSyncer::new(nft_type, event_provider.clone(), storage.clone(), tx.clone())
            })
            .collect();

        let listener = tokio::spawn(balance_manager.clone().run(rx));

        Self {
            owner,
            storage,
            balance_manager,
            sync_manager,
            syncers,
            chain_state: Mutex::new(ChainSyncState::NotSynced("not started".to_string())),
            listener,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Arc::new(Database::new(&config.database_url)?);
        info!("Database initialized");

        let client = RpcClient::new(&config.json_rpc_urls, config)?;
        info!(
            "RPC client ready, {} endpoint(s) configured",
            config.json_rpc_urls.len()
        );

        let event_provider = Arc::new(RpcEventProvider::new(client.clone(), config));

        Ok(Self::new(
            config.owner_address,
            storage,
            Arc::new(client),
            event_provider,
        ))
    }

    pub fn nft_balances(&self) -> Vec<NftBalance> {
        self.balance_manager.nft_balances()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<NftBalance>> {
        self.balance_manager.subscribe()
    }

    pub fn nft_balance(&self, contract_address: &Address, token_id: &U256) -> Option<NftBalance> {
        self.balance_manager.nft_balance(contract_address, token_id)
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Call data moving one ERC-721 token from the owner to `to`.
    pub fn transfer_eip721_data(
        &self,
        contract_address: Address,
        to: Address,
        token_id: U256,
    ) -> TransactionData {
        transactions::eip721_transfer(self.owner, contract_address, to, token_id)
    }

    /// Call data moving `value` units of an ERC-1155 token from the owner to `to`.
    pub fn transfer_eip1155_data(
        &self,
        contract_address: Address,
        to: Address,
        token_id: U256,
        value: U256,
    ) -> TransactionData {
        transactions::eip1155_transfer(self.owner, contract_address, to, token_id, value)
    }

    pub fn sync_manager(&self) -> &Arc<BalanceSyncManager> {
        &self.sync_manager
    }

    /// Explicit refresh; ignored until the chain client reports itself synced.
    pub fn sync(&self) {
        if self.chain_state() == ChainSyncState::Synced {
            self.sync_manager.sync();
        }
    }

    pub fn chain_state(&self) -> ChainSyncState {
        self.chain_state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| ChainSyncState::NotSynced("state lock poisoned".to_string()))
    }

    /// Hook for the chain client's sync-state signal.
    pub fn on_chain_sync_state(&self, state: ChainSyncState) {
        if let Ok(mut current) = self.chain_state.lock() {
            *current = state.clone();
        }

        match state {
            ChainSyncState::Synced => self.sync_manager.sync(),
            ChainSyncState::Syncing => {}
            ChainSyncState::NotSynced(reason) => warn!("Chain client not synced: {}", reason),
        }
    }

    /// Runs discovery for every standard. Returns the transactions seen and
    /// whether any standard was scanned for the first time.
    ///
    /// Standards are independent: a failing syncer is logged and the others
    /// still run. The first failure is returned once all of them finished.
    pub async fn discover(&self) -> Result<(Vec<ChainTransaction>, bool)> {
        let mut transactions = Vec::new();
        let mut initial = false;
        let mut first_error = None;

        for syncer in &self.syncers {
            match syncer.discover().await {
                Ok((found, first_scan)) => {
                    transactions.extend(found);
                    initial |= first_scan;
                }
                Err(e) => {
                    error!("{} discovery failed: {:#}", syncer.nft_type(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((transactions, initial)),
        }
    }

    /// Polls discovery forever, signalling a synced chain after each round.
    pub async fn run(&self, poll_interval: Duration) -> Result<()> {
        loop {
            match self.discover().await {
                Ok((transactions, initial)) => {
                    if !transactions.is_empty() {
                        info!(
                            "Discovery found {} transactions{}",
                            transactions.len(),
                            if initial { " (initial scan)" } else { "" }
                        );
                    }
                    self.on_chain_sync_state(ChainSyncState::Synced);
                }
                Err(e) => {
                    warn!("Discovery round incomplete, retrying next poll");
                    self.on_chain_sync_state(ChainSyncState::NotSynced(e.to_string()));
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Deletes every stored balance and event.
    pub fn clear(&self) -> Result<()> {
        self.storage.clear()?;
        info!("Cleared NFT balances and events");

        // an empty pass republishes the now empty list
        self.sync_manager.sync();
        Ok(())
    }
}

impl Drop for NftKit {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
