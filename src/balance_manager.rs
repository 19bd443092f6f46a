use crate::discovery::DiscoveredNfts;
use crate::repository::{Nft, NftBalance, NftType};
use crate::storage::{Storage, run_blocking};
use crate::sync_manager::{BalanceSyncManager, BalanceSyncObserver};
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Published view of the owner's NFT balances.
pub struct BalanceManager {
    storage: Arc<dyn Storage>,
    sync_manager: Arc<BalanceSyncManager>,
    balances: watch::Sender<Vec<NftBalance>>,
}

impl BalanceManager {
    pub fn new(storage: Arc<dyn Storage>, sync_manager: Arc<BalanceSyncManager>) -> Self {
        let (balances, _) = watch::channel(Vec::new());
        let manager = Self {
            storage,
            sync_manager,
            balances,
        };
        manager.reload();
        manager
    }

    pub fn nft_balances(&self) -> Vec<NftBalance> {
        self.balances.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<NftBalance>> {
        self.balances.subscribe()
    }

    /// Reads the store directly, so the answer reflects the latest committed
    /// state even between reloads.
    pub fn nft_balance(&self, contract_address: &Address, token_id: &U256) -> Option<NftBalance> {
        match self.storage.nft_balance(contract_address, token_id) {
            Ok(balance) => balance,
            Err(e) => {
                error!(
                    "Failed to read balance for {:?} #{}: {:#}",
                    contract_address, token_id, e
                );
                None
            }
        }
    }

    /// Marks every touched token unsynced (creating records for new ones),
    /// commits that, then asks for a sync.
    pub async fn handle_discovered(&self, nft_type: NftType, nfts: Vec<Nft>) {
        if nfts.is_empty() {
            return;
        }

        let count = nfts.len();
        match run_blocking(&self.storage, move |s| s.save_discovered(&nfts)).await {
            Ok(()) => info!("Marked {} {} tokens as not synced", count, nft_type),
            Err(e) => error!("Failed to save discovered {} tokens: {:#}", nft_type, e),
        }

        self.sync_manager.sync();
    }

    /// Drains discovery notifications until every syncer is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<DiscoveredNfts>) {
        while let Some(discovered) = rx.recv().await {
            self.handle_discovered(discovered.nft_type, discovered.nfts).await;
        }
        debug!("Discovery channel closed, balance manager stopped listening");
    }

    fn reload(&self) {
        match self.storage.nft_balances() {
            Ok(balances) => {
                self.balances.send_replace(balances);
            }
            Err(e) => error!("Failed to load NFT balances: {:#}", e),
        }
    }
}

impl BalanceSyncObserver for BalanceManager {
    fn did_finish_sync_balances(&self) {
        self.reload();
    }
}
