use crate::config::Config;
use crate::discovery::EventLogProvider;
use crate::events::{
    Transfer, TransferBatch, TransferSingle, decimalsCall, decode_transfer_batch_event,
    decode_transfer_event, decode_transfer_single_event, nameCall, symbolCall,
};
use crate::repository::{NftType, TransferDirection, TransferEvent};
use crate::rpc::RpcClient;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const RATE_LIMIT_DELAY_MS: u64 = 200; // 200ms between requests = 5 requests per second

#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// Finds transfers to or from the owner through `eth_getLogs`.
pub struct RpcEventProvider {
    client: RpcClient,
    owner: Address,
    contract_addresses: Vec<Address>,
    start_block: u64,
    batch_size: u64,
    metadata: Mutex<HashMap<Address, TokenMetadata>>,
}

/// Raw log decoded into the parts an event needs, before metadata is attached.
struct DecodedTransfer {
    tx_hash: B256,
    block_number: u64,
    contract_address: Address,
    from: Address,
    to: Address,
    token_id: U256,
    token_value: Option<U256>,
}

impl RpcEventProvider {
    pub fn new(client: RpcClient, config: &Config) -> Self {
        Self {
            client,
            owner: config.owner_address,
            contract_addresses: config.contract_addresses.clone(),
            start_block: config.start_block,
            batch_size: config.log_batch_size.max(1),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// One filter per direction: the owner as sender and as receiver.
    fn filters(&self, nft_type: NftType) -> Vec<Filter> {
        let owner = self.owner.into_word();
        let mut base = Vec::new();

        match nft_type {
            NftType::Eip721 => {
                let filter = Filter::new().event_signature(Transfer::SIGNATURE_HASH);
                base.push(filter.clone().topic1(owner));
                base.push(filter.topic2(owner));
            }
            NftType::Eip1155 => {
                let filter = Filter::new().event_signature(vec![
                    TransferSingle::SIGNATURE_HASH,
                    TransferBatch::SIGNATURE_HASH,
                ]);
                base.push(filter.clone().topic2(owner));
                base.push(filter.topic3(owner));
            }
        }

        if self.contract_addresses.is_empty() {
            base
        } else {
            base.into_iter()
                .map(|f| f.address(self.contract_addresses.clone()))
                .collect()
        }
    }

    fn decode(nft_type: NftType, log: &Log) -> Result<Vec<DecodedTransfer>> {
        let tx_hash = log
            .transaction_hash
            .context("Log without transaction hash")?;
        let block_number = log.block_number.context("Log without block number")?;
        let contract_address = log.address();

        let make = |from: Address, to: Address, token_id: U256, token_value: Option<U256>| DecodedTransfer {
            tx_hash,
            block_number,
            contract_address,
            from,
            to,
            token_id,
            token_value,
        };

        match nft_type {
            NftType::Eip721 => {
                let event = decode_transfer_event(log)?;
                Ok(vec![make(event.from, event.to, event.tokenId, None)])
            }
            NftType::Eip1155 => {
                if log.topics().first() == Some(&TransferBatch::SIGNATURE_HASH) {
                    let event = decode_transfer_batch_event(log)?;
                    if event.ids.len() != event.values.len() {
                        anyhow::bail!(
                            "TransferBatch with {} ids and {} values",
                            event.ids.len(),
                            event.values.len()
                        );
                    }
                    Ok(event
                        .ids
                        .iter()
                        .zip(event.values.iter())
                        .map(|(id, value)| make(event.from, event.to, *id, Some(*value)))
                        .collect())
                } else {
                    let event = decode_transfer_single_event(log)?;
                    Ok(vec![make(event.from, event.to, event.id, Some(event.value))])
                }
            }
        }
    }

    async fn token_metadata(&self, address: Address) -> TokenMetadata {
        if let Some(metadata) = self.metadata.lock().await.get(&address) {
            return metadata.clone();
        }

        let metadata = self.fetch_token_metadata(address).await;
        self.metadata.lock().await.insert(address, metadata.clone());
        metadata
    }

    async fn fetch_token_metadata(&self, address: Address) -> TokenMetadata {
        debug!("Fetching token metadata for {:?}", address);

        // All three are optional in both standards
        let name = self
            .call_optional(address, nameCall {}.abi_encode(), |data| {
                nameCall::abi_decode_returns(data).ok()
            })
            .await;

        let symbol = self
            .call_optional(address, symbolCall {}.abi_encode(), |data| {
                symbolCall::abi_decode_returns(data).ok()
            })
            .await;

        let decimals = self
            .call_optional(address, decimalsCall {}.abi_encode(), |data| {
                decimalsCall::abi_decode_returns(data).ok()
            })
            .await;

        TokenMetadata {
            name,
            symbol,
            decimals,
        }
    }

    async fn call_optional<T>(
        &self,
        address: Address,
        data: Vec<u8>,
        decode: impl Fn(&[u8]) -> Option<T>,
    ) -> Option<T> {
        match self.client.call_contract(address, Bytes::from(data)).await {
            Ok(result) => decode(&result),
            Err(e) => {
                debug!("Metadata call on {:?} failed: {}", address, e);
                None
            }
        }
    }
}

#[async_trait]
impl EventLogProvider for RpcEventProvider {
    async fn transfer_events(
        &self,
        nft_type: NftType,
        start_block: u64,
    ) -> Result<Vec<TransferEvent>> {
        let latest_block = self.client.get_latest_block().await?;
        let mut from = start_block.max(self.start_block);

        if from > latest_block {
            debug!("{} scan is at the chain head ({})", nft_type, latest_block);
            return Ok(Vec::new());
        }

        info!(
            "Scanning {} transfers for blocks {} to {}",
            nft_type, from, latest_block
        );

        let filters = self.filters(nft_type);
        let mut decoded = Vec::new();

        while from <= latest_block {
            let loop_start = Instant::now();
            let to_block = from.saturating_add(self.batch_size - 1).min(latest_block);

            for filter in &filters {
                let logs = self.client.get_logs(filter, from, to_block).await?;

                for log in &logs {
                    match Self::decode(nft_type, log) {
                        Ok(transfers) => decoded.extend(transfers),
                        Err(e) => warn!("Failed to decode {} transfer log: {}", nft_type, e),
                    }
                }
            }

            from = to_block + 1;

            // keep a minimum gap between windows
            let target_duration = Duration::from_millis(RATE_LIMIT_DELAY_MS);
            let loop_duration = loop_start.elapsed();
            if from <= latest_block && loop_duration < target_duration {
                sleep(target_duration - loop_duration).await;
            }
        }

        let mut events = Vec::with_capacity(decoded.len());
        for transfer in decoded {
            let metadata = self.token_metadata(transfer.contract_address).await;
            events.push(TransferEvent {
                tx_hash: transfer.tx_hash,
                block_number: transfer.block_number,
                contract_address: transfer.contract_address,
                from: transfer.from,
                to: transfer.to,
                token_id: transfer.token_id,
                token_value: transfer.token_value,
                token_name: metadata.name.unwrap_or_default(),
                token_symbol: metadata.symbol.unwrap_or_default(),
                token_decimal: match nft_type {
                    NftType::Eip721 => metadata.decimals,
                    NftType::Eip1155 => None,
                },
            });
        }

        // A self-transfer matches both filters
        events.sort_by_key(|e| (e.block_number, e.tx_hash, e.contract_address, e.token_id));
        events.dedup_by(|a, b| {
            a.tx_hash == b.tx_hash && a.contract_address == b.contract_address && a.token_id == b.token_id
        });

        let incoming = events
            .iter()
            .filter(|e| e.directions(self.owner).contains(&TransferDirection::Incoming))
            .count();
        info!(
            "Fetched {} {} transfer events ({} incoming, {} outgoing)",
            events.len(),
            nft_type,
            incoming,
            events.len() - incoming
        );
        Ok(events)
    }
}
