use crate::repository::{ChainTransaction, Nft, NftType, TransferEvent};
use crate::storage::{Storage, run_blocking};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Source of transfer events touching the owner.
#[async_trait]
pub trait EventLogProvider: Send + Sync {
    async fn transfer_events(&self, nft_type: NftType, start_block: u64)
    -> Result<Vec<TransferEvent>>;
}

/// Tokens touched by one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveredNfts {
    pub nft_type: NftType,
    pub nfts: Vec<Nft>,
}

/// Incrementally scans one standard's transfer events, starting after the
/// highest stored block.
pub struct TransactionSyncer {
    nft_type: NftType,
    provider: Arc<dyn EventLogProvider>,
    storage: Arc<dyn Storage>,
    notifier: mpsc::UnboundedSender<DiscoveredNfts>,
}

impl TransactionSyncer {
    pub fn new(
        nft_type: NftType,
        provider: Arc<dyn EventLogProvider>,
        storage: Arc<dyn Storage>,
        notifier: mpsc::UnboundedSender<DiscoveredNfts>,
    ) -> Self {
        Self {
            nft_type,
            provider,
            storage,
            notifier,
        }
    }

    pub fn nft_type(&self) -> NftType {
        self.nft_type
    }

    /// Returns the chain transactions seen in this pass and whether this was
    /// the initial scan (nothing stored yet for this standard).
    pub async fn discover(&self) -> Result<(Vec<ChainTransaction>, bool)> {
        let nft_type = self.nft_type;
        let last_block = run_blocking(&self.storage, move |s| s.last_event_block(nft_type))
            .await
            .with_context(|| format!("Failed to read {nft_type} checkpoint"))?
            .unwrap_or(0);
        let initial = last_block == 0;

        let events = match self
            .provider
            .transfer_events(self.nft_type, last_block + 1)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    "Failed to fetch {} events from block {}: {:#}",
                    self.nft_type,
                    last_block + 1,
                    e
                );
                return Ok((Vec::new(), initial));
            }
        };

        if events.is_empty() {
            debug!("No new {} events after block {}", self.nft_type, last_block);
            return Ok((Vec::new(), initial));
        }

        let nfts = Self::unique_nfts(nft_type, &events);
        let transactions = Self::transactions(&events);
        let fetched = events.len();

        // Events must be stored before anyone acts on them; the checkpoint is
        // derived from the stored rows.
        match run_blocking(&self.storage, move |s| s.save_events(nft_type, &events)).await {
            Ok(inserted) => info!(
                "Stored {} new {} events ({} fetched)",
                inserted, nft_type, fetched
            ),
            Err(e) => {
                error!("Failed to store {} events: {:#}", nft_type, e);
                return Ok((Vec::new(), initial));
            }
        }

        info!("Discovered {} {} tokens", nfts.len(), nft_type);

        if self
            .notifier
            .send(DiscoveredNfts {
                nft_type: self.nft_type,
                nfts,
            })
            .is_err()
        {
            warn!("Balance manager is gone, dropping discovered {} tokens", self.nft_type);
        }

        Ok((transactions, initial))
    }

    fn unique_nfts(nft_type: NftType, events: &[TransferEvent]) -> Vec<Nft> {
        let mut seen = HashSet::new();
        events
            .iter()
            .map(|event| event.nft(nft_type))
            .filter(|nft| seen.insert(nft.clone()))
            .collect()
    }

    fn transactions(events: &[TransferEvent]) -> Vec<ChainTransaction> {
        let mut seen = HashSet::new();
        events
            .iter()
            .filter(|event| seen.insert(event.tx_hash))
            .map(|event| ChainTransaction {
                hash: event.tx_hash,
                block_number: event.block_number,
            })
            .collect()
    }
}
