pub mod balance_manager;
pub mod config;
pub mod discovery;
pub mod events;
pub mod kit;
pub mod log_provider;
pub mod probe;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod storage;
pub mod sync_manager;
pub mod transactions;

pub use balance_manager::BalanceManager;
pub use discovery::{DiscoveredNfts, EventLogProvider, TransactionSyncer};
pub use kit::{ChainSyncState, NftKit};
pub use probe::{BalanceProbe, CallError, LedgerClient, ProbeError};
pub use repository::{
    ChainTransaction, Nft, NftBalance, NftType, TransferDirection, TransferEvent,
};
pub use storage::Storage;
pub use sync_manager::{BalanceSyncManager, BalanceSyncObserver, SyncState};
pub use transactions::TransactionData;
