use crate::events::{balanceOfCall, ownerOfCall};
use crate::repository::{Nft, NftType};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The node answered with an error, e.g. the call reverted.
    #[error("Call reverted: {0}")]
    Reverted(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Read-only contract calls against the chain.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn call(&self, contract_address: Address, data: Bytes) -> Result<Bytes, CallError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Invalid owner data: {0}")]
    InvalidOwnerData(String),

    #[error("Invalid balance data: {0}")]
    InvalidBalanceData(String),
}

/// Resolves how many units of a token `owner` holds.
#[derive(Clone)]
pub struct BalanceProbe {
    client: Arc<dyn LedgerClient>,
    owner: Address,
}

impl BalanceProbe {
    pub fn new(client: Arc<dyn LedgerClient>, owner: Address) -> Self {
        Self { client, owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub async fn probe(&self, nft: &Nft) -> Result<u64, ProbeError> {
        match nft.nft_type {
            NftType::Eip721 => match self.eip721_owner(nft).await {
                Ok(owner) => Ok(u64::from(owner == self.owner)),
                // A burned or never minted token reverts on ownerOf
                Err(ProbeError::Call(CallError::Reverted(reason))) => {
                    debug!(
                        "ownerOf reverted for {:?} #{}: {}",
                        nft.contract_address, nft.token_id, reason
                    );
                    Ok(0)
                }
                Err(e) => Err(e),
            },
            NftType::Eip1155 => self.eip1155_balance(nft).await,
        }
    }

    async fn eip721_owner(&self, nft: &Nft) -> Result<Address, ProbeError> {
        let data = ownerOfCall {
            tokenId: nft.token_id,
        }
        .abi_encode();

        let result = self
            .client
            .call(nft.contract_address, Bytes::from(data))
            .await?;

        ownerOfCall::abi_decode_returns(&result)
            .map_err(|e| ProbeError::InvalidOwnerData(e.to_string()))
    }

    async fn eip1155_balance(&self, nft: &Nft) -> Result<u64, ProbeError> {
        let data = balanceOfCall {
            account: self.owner,
            id: nft.token_id,
        }
        .abi_encode();

        let result = self
            .client
            .call(nft.contract_address, Bytes::from(data))
            .await?;

        let balance = balanceOfCall::abi_decode_returns(&result)
            .map_err(|e| ProbeError::InvalidBalanceData(e.to_string()))?;

        // balances are stored as SQLite INTEGER
        u64::try_from(balance)
            .ok()
            .filter(|b| i64::try_from(*b).is_ok())
            .ok_or_else(|| ProbeError::InvalidBalanceData(format!("{balance} is out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::sync::Mutex;

    struct FakeLedger {
        response: Result<Bytes, CallError>,
        calls: Mutex<Vec<(Address, Bytes)>>,
    }

    impl FakeLedger {
        fn new(response: Result<Bytes, CallError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn call(&self, contract_address: Address, data: Bytes) -> Result<Bytes, CallError> {
            self.calls.lock().unwrap().push((contract_address, data));
            self.response.clone()
        }
    }

    fn owner() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn word(value: U256) -> Bytes {
        Bytes::from(value.to_be_bytes::<32>().to_vec())
    }

    fn address_word(address: Address) -> Bytes {
        Bytes::from(address.into_word().to_vec())
    }

    fn nft(nft_type: NftType) -> Nft {
        Nft::new(nft_type, Address::repeat_byte(0xcc), U256::from(77))
    }

    #[tokio::test]
    async fn eip721_owned_by_us_is_one() {
        let ledger = FakeLedger::new(Ok(address_word(owner())));
        let probe = BalanceProbe::new(ledger.clone(), owner());

        assert_eq!(probe.probe(&nft(NftType::Eip721)).await.unwrap(), 1);

        let calls = ledger.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Address::repeat_byte(0xcc));
        assert_eq!(&calls[0].1[..4], &ownerOfCall::SELECTOR[..]);
    }

    #[tokio::test]
    async fn eip721_owned_by_someone_else_is_zero() {
        let ledger = FakeLedger::new(Ok(address_word(Address::repeat_byte(0x0b))));
        let probe = BalanceProbe::new(ledger, owner());

        assert_eq!(probe.probe(&nft(NftType::Eip721)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn eip721_revert_is_zero_not_failure() {
        let ledger = FakeLedger::new(Err(CallError::Reverted(
            "ERC721: invalid token ID".to_string(),
        )));
        let probe = BalanceProbe::new(ledger, owner());

        assert_eq!(probe.probe(&nft(NftType::Eip721)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn eip721_transport_error_fails() {
        let ledger = FakeLedger::new(Err(CallError::Transport("connection reset".to_string())));
        let probe = BalanceProbe::new(ledger, owner());

        let err = probe.probe(&nft(NftType::Eip721)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Call(CallError::Transport(_))));
    }

    #[tokio::test]
    async fn eip1155_returns_remote_balance() {
        let ledger = FakeLedger::new(Ok(word(U256::from(42))));
        let probe = BalanceProbe::new(ledger.clone(), owner());

        assert_eq!(probe.probe(&nft(NftType::Eip1155)).await.unwrap(), 42);

        let calls = ledger.calls.lock().unwrap();
        let decoded = balanceOfCall::abi_decode(&calls[0].1).unwrap();
        assert_eq!(decoded.account, owner());
        assert_eq!(decoded.id, U256::from(77));
    }

    #[tokio::test]
    async fn eip1155_revert_is_a_failure() {
        let ledger = FakeLedger::new(Err(CallError::Reverted("bad id".to_string())));
        let probe = BalanceProbe::new(ledger, owner());

        assert!(probe.probe(&nft(NftType::Eip1155)).await.is_err());
    }

    #[tokio::test]
    async fn eip1155_balance_too_large_is_invalid() {
        let ledger = FakeLedger::new(Ok(word(U256::MAX)));
        let probe = BalanceProbe::new(ledger, owner());

        let err = probe.probe(&nft(NftType::Eip1155)).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidBalanceData(_)));
    }

    #[tokio::test]
    async fn eip1155_balance_must_fit_a_database_integer() {
        let at_limit = FakeLedger::new(Ok(word(U256::from(i64::MAX as u64))));
        let probe = BalanceProbe::new(at_limit, owner());
        assert_eq!(
            probe.probe(&nft(NftType::Eip1155)).await.unwrap(),
            i64::MAX as u64
        );

        let above_limit = FakeLedger::new(Ok(word(U256::from(u64::MAX))));
        let probe = BalanceProbe::new(above_limit, owner());
        let err = probe.probe(&nft(NftType::Eip1155)).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidBalanceData(_)));
    }
}
