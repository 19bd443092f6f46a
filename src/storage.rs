use crate::repository::{
    BalanceRepository, Database, EventRepository, EventStats, Nft, NftBalance, NftType,
    SyncedBalance, TransferEvent,
};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use std::sync::Arc;

/// Durable store for balance records and per-standard transfer events.
///
/// Every batch write is atomic: either all rows of the batch are committed or
/// none are.
pub trait Storage: Send + Sync {
    fn nft_balances(&self) -> Result<Vec<NftBalance>>;

    fn non_synced_nft_balances(&self) -> Result<Vec<NftBalance>>;

    fn nft_balance(&self, contract_address: &Address, token_id: &U256)
    -> Result<Option<NftBalance>>;

    /// Creates missing records unsynced with balance 0 and invalidates
    /// existing ones.
    fn save_discovered(&self, nfts: &[Nft]) -> Result<()>;

    /// Commits probe results; returns how many rows were actually marked synced.
    fn set_synced(&self, balances: &[SyncedBalance]) -> Result<usize>;

    fn last_event_block(&self, nft_type: NftType) -> Result<Option<u64>>;

    fn save_events(&self, nft_type: NftType, events: &[TransferEvent]) -> Result<usize>;

    fn events(&self, nft_type: NftType, limit: usize, offset: usize) -> Result<Vec<TransferEvent>>;

    fn event_stats(&self, nft_type: NftType) -> Result<EventStats>;

    fn clear(&self) -> Result<()>;
}

/// Runs a store operation on the blocking thread pool so SQLite work never
/// stalls the async workers.
pub async fn run_blocking<T, F>(storage: &Arc<dyn Storage>, op: F) -> Result<T>
where
    F: FnOnce(&dyn Storage) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || op(storage.as_ref())).await?
}

impl Storage for Database {
    fn nft_balances(&self) -> Result<Vec<NftBalance>> {
        let conn = self.conn()?;
        BalanceRepository::new(&conn).get_all()
    }

    fn non_synced_nft_balances(&self) -> Result<Vec<NftBalance>> {
        let conn = self.conn()?;
        BalanceRepository::new(&conn).get_not_synced()
    }

    fn nft_balance(
        &self,
        contract_address: &Address,
        token_id: &U256,
    ) -> Result<Option<NftBalance>> {
        let conn = self.conn()?;
        BalanceRepository::new(&conn).get(contract_address, token_id)
    }

    fn save_discovered(&self, nfts: &[Nft]) -> Result<()> {
        let conn = self.conn()?;
        BalanceRepository::new(&conn).save_discovered(nfts)?;
        Ok(())
    }

    fn set_synced(&self, balances: &[SyncedBalance]) -> Result<usize> {
        let conn = self.conn()?;
        BalanceRepository::new(&conn).set_synced(balances)
    }

    fn last_event_block(&self, nft_type: NftType) -> Result<Option<u64>> {
        let conn = self.conn()?;
        EventRepository::new(&conn, nft_type).get_last_block()
    }

    fn save_events(&self, nft_type: NftType, events: &[TransferEvent]) -> Result<usize> {
        let conn = self.conn()?;
        EventRepository::new(&conn, nft_type).insert_batch(events)
    }

    fn events(&self, nft_type: NftType, limit: usize, offset: usize) -> Result<Vec<TransferEvent>> {
        let conn = self.conn()?;
        EventRepository::new(&conn, nft_type).query_events(limit, offset)
    }

    fn event_stats(&self, nft_type: NftType) -> Result<EventStats> {
        let conn = self.conn()?;
        EventRepository::new(&conn, nft_type).get_statistics()
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        BalanceRepository::new(&tx).delete_all()?;
        for nft_type in NftType::ALL {
            EventRepository::new(&tx, nft_type).delete_all()?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn clear_removes_balances_and_events() {
        let db = Database::in_memory().unwrap();
        let contract = Address::repeat_byte(0x42);
        let nft = Nft::new(NftType::Eip1155, contract, U256::from(1));

        db.save_discovered(std::slice::from_ref(&nft)).unwrap();
        db.save_events(
            NftType::Eip1155,
            &[TransferEvent {
                tx_hash: B256::repeat_byte(1),
                block_number: 10,
                contract_address: contract,
                from: Address::ZERO,
                to: Address::repeat_byte(1),
                token_id: U256::from(1),
                token_value: Some(U256::from(2)),
                token_name: String::new(),
                token_symbol: String::new(),
                token_decimal: None,
            }],
        )
        .unwrap();

        db.clear().unwrap();

        assert!(db.nft_balances().unwrap().is_empty());
        assert_eq!(db.last_event_block(NftType::Eip1155).unwrap(), None);
    }

    #[test]
    fn lookup_reads_through_to_latest_state() {
        let db = Database::in_memory().unwrap();
        let contract = Address::repeat_byte(0x42);
        let nft = Nft::new(NftType::Eip721, contract, U256::from(5));

        assert!(db.nft_balance(&contract, &U256::from(5)).unwrap().is_none());

        db.save_discovered(std::slice::from_ref(&nft)).unwrap();
        db.set_synced(&[SyncedBalance {
            nft: nft.clone(),
            balance: 1,
            revision: 0,
        }])
        .unwrap();

        let record = db.nft_balance(&contract, &U256::from(5)).unwrap().unwrap();
        assert!(record.synced);
        assert_eq!(record.balance, 1);
    }

    #[tokio::test]
    async fn blocking_calls_leave_the_runtime_thread() {
        let storage: Arc<dyn Storage> = Arc::new(Database::in_memory().unwrap());
        let runtime_thread = std::thread::current().id();

        let thread = run_blocking(&storage, |_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(thread, runtime_thread);

        let balances = run_blocking(&storage, |s| s.nft_balances()).await.unwrap();
        assert!(balances.is_empty());
    }
}
