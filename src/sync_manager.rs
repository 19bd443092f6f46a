//! Single-flight balance synchronization.
//!
//! At most one pass probes the chain at a time. Requests that arrive while a
//! pass is running collapse into a single follow-up pass, so no request is
//! lost and a burst of requests costs at most one extra pass.

use crate::probe::BalanceProbe;
use crate::repository::{NftBalance, SyncedBalance};
use crate::storage::{Storage, run_blocking};
use futures::future::join_all;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    /// Another request arrived during the running pass.
    SyncingWithPending,
}

/// Notified after every completed pass, before the manager goes idle.
pub trait BalanceSyncObserver: Send + Sync {
    fn did_finish_sync_balances(&self);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub probed: usize,
    pub synced: usize,
    pub failed: usize,
}

pub struct BalanceSyncManager {
    storage: Arc<dyn Storage>,
    probe: BalanceProbe,
    state: watch::Sender<SyncState>,
    observer: Mutex<Option<Weak<dyn BalanceSyncObserver>>>,
}

impl BalanceSyncManager {
    pub fn new(storage: Arc<dyn Storage>, probe: BalanceProbe) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            storage,
            probe,
            state,
            observer: Mutex::new(None),
        }
    }

    pub fn set_observer(&self, observer: Weak<dyn BalanceSyncObserver>) {
        if let Ok(mut slot) = self.observer.lock() {
            *slot = Some(observer);
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Resolves once no pass is running or queued.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|state| *state == SyncState::Idle).await;
    }

    /// Requests a refresh of every unsynced balance. Starts a pass when idle,
    /// otherwise queues one follow-up pass.
    pub fn sync(self: &Arc<Self>) {
        let mut start = false;

        self.state.send_if_modified(|state| match *state {
            SyncState::Idle => {
                *state = SyncState::Syncing;
                start = true;
                true
            }
            SyncState::Syncing => {
                *state = SyncState::SyncingWithPending;
                true
            }
            SyncState::SyncingWithPending => false,
        });

        if start {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_passes().await });
        } else {
            debug!("Balance sync already running, queued another pass");
        }
    }

    async fn run_passes(self: Arc<Self>) {
        loop {
            let summary = self.sync_balances().await;
            if summary.probed > 0 {
                info!(
                    "Balance sync pass finished: {} probed, {} synced, {} failed",
                    summary.probed, summary.synced, summary.failed
                );
            }

            self.notify_observer().await;

            let mut again = false;
            self.state.send_if_modified(|state| match *state {
                SyncState::SyncingWithPending => {
                    *state = SyncState::Syncing;
                    again = true;
                    true
                }
                SyncState::Syncing | SyncState::Idle => {
                    *state = SyncState::Idle;
                    true
                }
            });

            if !again {
                break;
            }
        }
    }

    /// One pass: probe every unsynced balance concurrently, then commit the
    /// successful results in a single batch.
    pub async fn sync_balances(&self) -> PassSummary {
        let balances = match run_blocking(&self.storage, |s| s.non_synced_nft_balances()).await {
            Ok(balances) => balances,
            Err(e) => {
                error!("Failed to read unsynced balances: {:#}", e);
                return PassSummary::default();
            }
        };

        if balances.is_empty() {
            return PassSummary::default();
        }

        let start = Instant::now();
        debug!("Probing {} unsynced balances", balances.len());

        let results = join_all(balances.into_iter().map(|balance| async move {
            let result = self.probe.probe(&balance.nft).await;
            (balance, result)
        }))
        .await;

        let probed = results.len();
        let mut synced_balances = Vec::new();

        for (NftBalance { nft, revision, .. }, result) in results {
            match result {
                Ok(balance) => synced_balances.push(SyncedBalance {
                    nft,
                    balance,
                    revision,
                }),
                Err(e) => warn!(
                    "Failed to sync balance for {} - {:?} - {}: {}",
                    nft.token_name, nft.contract_address, nft.token_id, e
                ),
            }
        }

        let probe_failures = probed - synced_balances.len();
        let to_commit = synced_balances.len();

        let committed = run_blocking(&self.storage, move |s| s.set_synced(&synced_balances)).await;
        let summary = match committed {
            Ok(applied) => {
                if applied < to_commit {
                    debug!(
                        "{} balances were invalidated during the pass and stay unsynced",
                        to_commit - applied
                    );
                }
                PassSummary {
                    probed,
                    synced: applied,
                    failed: probe_failures,
                }
            }
            Err(e) => {
                error!("Failed to store synced balances: {:#}", e);
                // nothing was committed, every probed balance stays unsynced
                PassSummary {
                    probed,
                    synced: 0,
                    failed: probed,
                }
            }
        };

        debug!("Balance sync pass took {:?}", start.elapsed());
        summary
    }

    async fn notify_observer(&self) {
        let observer = self
            .observer
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));

        // observers reload from the store
        if let Some(observer) = observer {
            let notified =
                tokio::task::spawn_blocking(move || observer.did_finish_sync_balances()).await;
            if let Err(e) = notified {
                error!("Balance sync observer panicked: {}", e);
            }
        }
    }
}
