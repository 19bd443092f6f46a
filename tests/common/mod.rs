#![allow(dead_code)]

use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use nft_balance_sync::events::{balanceOfCall, ownerOfCall};
use nft_balance_sync::repository::{Database, EventStats, SyncedBalance};
use nft_balance_sync::{
    BalanceSyncObserver, CallError, EventLogProvider, LedgerClient, Nft, NftBalance, NftType,
    Storage, TransferEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn owner() -> Address {
    Address::repeat_byte(0x0a)
}

pub fn contract() -> Address {
    Address::repeat_byte(0xcc)
}

pub fn nft(nft_type: NftType, token_id: u64) -> Nft {
    Nft::new(nft_type, contract(), U256::from(token_id)).with_name("Test Collection")
}

pub fn memory_db() -> Arc<Database> {
    Arc::new(Database::in_memory().expect("Failed to open in-memory database"))
}

pub fn transfer(tx: u8, block: u64, token_id: u64, value: Option<u64>) -> TransferEvent {
    TransferEvent {
        tx_hash: B256::repeat_byte(tx),
        block_number: block,
        contract_address: contract(),
        from: Address::ZERO,
        to: owner(),
        token_id: U256::from(token_id),
        token_value: value.map(U256::from),
        token_name: "Test Collection".to_string(),
        token_symbol: "TST".to_string(),
        token_decimal: None,
    }
}

fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

/// Answers `ownerOf` with the owner and `balanceOf` with a configurable
/// amount. Failing token ids get a transport error. Calls can be held at a
/// gate; the answer is fixed when the call arrives, not when it is released.
pub struct FakeLedger {
    balance: AtomicU64,
    token_balances: Mutex<HashMap<U256, U256>>,
    failing: Mutex<HashSet<U256>>,
    calls: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
}

impl FakeLedger {
    pub fn new(balance: u64) -> Arc<Self> {
        Arc::new(Self {
            balance: AtomicU64::new(balance),
            token_balances: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Held calls wait until `open` is called.
    pub fn gated(balance: u64) -> Arc<Self> {
        let ledger = Self::new(balance);
        ledger.gated.store(true, Ordering::SeqCst);
        ledger
    }

    pub fn open(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.close();
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::SeqCst);
    }

    /// Overrides the `balanceOf` answer for one token.
    pub fn set_token_balance(&self, token_id: u64, balance: U256) {
        self.token_balances
            .lock()
            .unwrap()
            .insert(U256::from(token_id), balance);
    }

    pub fn fail_token(&self, token_id: u64) {
        self.failing.lock().unwrap().insert(U256::from(token_id));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, count: usize) {
        tokio::time::timeout(TIMEOUT, async {
            while self.calls() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Ledger was never called");
    }

    fn answer(&self, data: &Bytes) -> Result<Bytes, CallError> {
        if let Ok(call) = ownerOfCall::abi_decode(data) {
            if self.failing.lock().unwrap().contains(&call.tokenId) {
                return Err(CallError::Transport("connection reset".to_string()));
            }
            return Ok(Bytes::from(owner().into_word().to_vec()));
        }

        let call = balanceOfCall::abi_decode(data)
            .map_err(|e| CallError::Reverted(format!("unknown selector: {e}")))?;
        if self.failing.lock().unwrap().contains(&call.id) {
            return Err(CallError::Transport("connection reset".to_string()));
        }
        let balance = self
            .token_balances
            .lock()
            .unwrap()
            .get(&call.id)
            .copied()
            .unwrap_or_else(|| U256::from(self.balance.load(Ordering::SeqCst)));
        Ok(word(balance))
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn call(&self, _contract_address: Address, data: Bytes) -> Result<Bytes, CallError> {
        let answer = self.answer(&data);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.gated.load(Ordering::SeqCst) {
            // closed once opened, so acquire returns straight away
            let _ = self.gate.acquire().await;
        }
        answer
    }
}

/// Serves each standard's queued batches in order, then nothing.
#[derive(Default)]
pub struct FakeEventProvider {
    batches: Mutex<HashMap<NftType, Vec<Vec<TransferEvent>>>>,
}

impl FakeEventProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, nft_type: NftType, events: Vec<TransferEvent>) {
        self.batches
            .lock()
            .unwrap()
            .entry(nft_type)
            .or_default()
            .push(events);
    }
}

#[async_trait]
impl EventLogProvider for FakeEventProvider {
    async fn transfer_events(
        &self,
        nft_type: NftType,
        start_block: u64,
    ) -> Result<Vec<TransferEvent>> {
        let mut batches = self.batches.lock().unwrap();
        let queue = batches.entry(nft_type).or_default();
        if queue.is_empty() {
            return Ok(Vec::new());
        }

        Ok(queue
            .remove(0)
            .into_iter()
            .filter(|event| event.block_number >= start_block)
            .collect())
    }
}

#[derive(Default)]
pub struct CountingObserver {
    count: AtomicUsize,
}

impl CountingObserver {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl BalanceSyncObserver for CountingObserver {
    fn did_finish_sync_balances(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// SQLite store that remembers which threads touched it and can be told to
/// fail a checkpoint read or the balance write-back.
pub struct RecordingStorage {
    inner: Database,
    threads: Mutex<Vec<ThreadId>>,
    failing_checkpoint: Mutex<Option<NftType>>,
    failing_write_back: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Database::in_memory().expect("Failed to open in-memory database"),
            threads: Mutex::new(Vec::new()),
            failing_checkpoint: Mutex::new(None),
            failing_write_back: AtomicBool::new(false),
        })
    }

    pub fn fail_checkpoint(&self, nft_type: NftType) {
        *self.failing_checkpoint.lock().unwrap() = Some(nft_type);
    }

    pub fn fail_write_back(&self) {
        self.failing_write_back.store(true, Ordering::SeqCst);
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    fn record(&self) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }
}

impl Storage for RecordingStorage {
    fn nft_balances(&self) -> Result<Vec<NftBalance>> {
        self.record();
        self.inner.nft_balances()
    }

    fn non_synced_nft_balances(&self) -> Result<Vec<NftBalance>> {
        self.record();
        self.inner.non_synced_nft_balances()
    }

    fn nft_balance(&self, contract_address: &Address, token_id: &U256) -> Result<Option<NftBalance>> {
        self.record();
        self.inner.nft_balance(contract_address, token_id)
    }

    fn save_discovered(&self, nfts: &[Nft]) -> Result<()> {
        self.record();
        self.inner.save_discovered(nfts)
    }

    fn set_synced(&self, balances: &[SyncedBalance]) -> Result<usize> {
        self.record();
        if self.failing_write_back.load(Ordering::SeqCst) {
            anyhow::bail!("disk I/O error");
        }
        self.inner.set_synced(balances)
    }

    fn last_event_block(&self, nft_type: NftType) -> Result<Option<u64>> {
        self.record();
        if *self.failing_checkpoint.lock().unwrap() == Some(nft_type) {
            anyhow::bail!("database is locked");
        }
        self.inner.last_event_block(nft_type)
    }

    fn save_events(&self, nft_type: NftType, events: &[TransferEvent]) -> Result<usize> {
        self.record();
        self.inner.save_events(nft_type, events)
    }

    fn events(&self, nft_type: NftType, limit: usize, offset: usize) -> Result<Vec<TransferEvent>> {
        self.record();
        self.inner.events(nft_type, limit, offset)
    }

    fn event_stats(&self, nft_type: NftType) -> Result<EventStats> {
        self.record();
        self.inner.event_stats(nft_type)
    }

    fn clear(&self) -> Result<()> {
        self.record();
        self.inner.clear()
    }
}
