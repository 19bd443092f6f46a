use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NftType {
    /// Single-owner tokens, balance is 0 or 1 per address.
    Eip721,
    /// Multi-owner tokens, any quantity per address.
    Eip1155,
}

impl NftType {
    pub const ALL: [NftType; 2] = [NftType::Eip721, NftType::Eip1155];

    pub fn as_str(&self) -> &'static str {
        match self {
            NftType::Eip721 => "eip721",
            NftType::Eip1155 => "eip1155",
        }
    }

    pub fn events_table(&self) -> &'static str {
        match self {
            NftType::Eip721 => "eip721_events",
            NftType::Eip1155 => "eip1155_events",
        }
    }
}

impl fmt::Display for NftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NftType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eip721" | "erc721" => Ok(NftType::Eip721),
            "eip1155" | "erc1155" => Ok(NftType::Eip1155),
            other => Err(anyhow::anyhow!("Unknown NFT type: {}", other)),
        }
    }
}

/// A token identity. `token_name` is metadata and takes no part in equality.
#[derive(Debug, Clone)]
pub struct Nft {
    pub nft_type: NftType,
    pub contract_address: Address,
    pub token_id: U256,
    pub token_name: String,
}

impl Nft {
    pub fn new(nft_type: NftType, contract_address: Address, token_id: U256) -> Self {
        Self {
            nft_type,
            contract_address,
            token_id,
            token_name: String::new(),
        }
    }

    pub fn with_name(mut self, token_name: impl Into<String>) -> Self {
        self.token_name = token_name.into();
        self
    }
}

impl PartialEq for Nft {
    fn eq(&self, other: &Self) -> bool {
        self.nft_type == other.nft_type
            && self.contract_address == other.contract_address
            && self.token_id == other.token_id
    }
}

impl Eq for Nft {}

impl Hash for Nft {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nft_type.hash(state);
        self.contract_address.hash(state);
        self.token_id.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftBalance {
    pub nft: Nft,
    pub balance: u64,
    pub synced: bool,
    /// Bumped every time discovery invalidates the row.
    pub revision: u64,
}

/// Probe result to be written back, guarded by the revision read at pass start.
#[derive(Debug, Clone)]
pub struct SyncedBalance {
    pub nft: Nft,
    pub balance: u64,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub contract_address: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub token_value: Option<U256>,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: Option<u8>,
}

/// Which way a transfer moved relative to a given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

impl TransferEvent {
    pub fn nft(&self, nft_type: NftType) -> Nft {
        Nft::new(nft_type, self.contract_address, self.token_id).with_name(&self.token_name)
    }

    /// Outgoing if `user` sent it, incoming if `user` received it. A transfer
    /// to oneself is both; a transfer between strangers is neither.
    pub fn directions(&self, user: Address) -> Vec<TransferDirection> {
        let mut directions = Vec::with_capacity(2);
        if self.from == user {
            directions.push(TransferDirection::Outgoing);
        }
        if self.to == user {
            directions.push(TransferDirection::Incoming);
        }
        directions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_name_is_not_part_of_identity() {
        let contract = Address::repeat_byte(0x11);
        let a = Nft::new(NftType::Eip721, contract, U256::from(7)).with_name("Punk");
        let b = Nft::new(NftType::Eip721, contract, U256::from(7)).with_name("Renamed");
        let c = Nft::new(NftType::Eip1155, contract, U256::from(7));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Nft> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    fn transfer(from: Address, to: Address) -> TransferEvent {
        TransferEvent {
            tx_hash: B256::repeat_byte(1),
            block_number: 1,
            contract_address: Address::repeat_byte(0x11),
            from,
            to,
            token_id: U256::from(1),
            token_value: None,
            token_name: String::new(),
            token_symbol: String::new(),
            token_decimal: None,
        }
    }

    #[test]
    fn directions_follow_sender_and_receiver() {
        let me = Address::repeat_byte(0x0a);
        let other = Address::repeat_byte(0x0b);

        assert_eq!(
            transfer(Address::ZERO, me).directions(me),
            vec![TransferDirection::Incoming]
        );
        assert_eq!(
            transfer(me, other).directions(me),
            vec![TransferDirection::Outgoing]
        );
        assert_eq!(
            transfer(me, me).directions(me),
            vec![TransferDirection::Outgoing, TransferDirection::Incoming]
        );
        assert!(transfer(other, Address::ZERO).directions(me).is_empty());
    }

    #[test]
    fn nft_type_parses_both_spellings() {
        assert_eq!("ERC721".parse::<NftType>().unwrap(), NftType::Eip721);
        assert_eq!("eip1155".parse::<NftType>().unwrap(), NftType::Eip1155);
        assert!("erc20".parse::<NftType>().is_err());
    }
}
