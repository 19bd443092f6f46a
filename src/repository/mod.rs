pub mod balance_repository;
pub mod database;
pub mod event_repository;
pub mod models;

pub use balance_repository::BalanceRepository;
pub use database::Database;
pub use event_repository::{EventRepository, EventStats};
pub use models::{
    ChainTransaction, Nft, NftBalance, NftType, SyncedBalance, TransferDirection, TransferEvent,
};

use alloy_primitives::{Address, U256};
use rusqlite::Row;
use std::str::FromStr;

/// Pad a U256 to 78 digits so text ordering matches numeric ordering.
/// U256 max is approximately 10^77, so 78 digits is sufficient.
pub fn pad_u256(value: &U256) -> String {
    format!("{:0>78}", value.to_string())
}

pub fn unpad_u256(padded: &str) -> Result<U256, alloy_primitives::ruint::ParseError> {
    let trimmed = padded.trim_start_matches('0');
    if trimmed.is_empty() {
        Ok(U256::ZERO)
    } else {
        U256::from_str(trimmed)
    }
}

fn column_error(index: usize, e: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, e)
}

fn parse_address(row: &Row, index: usize) -> rusqlite::Result<Address> {
    Address::from_str(&row.get::<_, String>(index)?).map_err(|e| column_error(index, Box::new(e)))
}

fn parse_padded_u256(row: &Row, index: usize) -> rusqlite::Result<U256> {
    unpad_u256(&row.get::<_, String>(index)?).map_err(|e| column_error(index, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_round_trips_zero_and_max() {
        assert_eq!(unpad_u256(&pad_u256(&U256::ZERO)).unwrap(), U256::ZERO);
        assert_eq!(unpad_u256(&pad_u256(&U256::MAX)).unwrap(), U256::MAX);
        assert_eq!(pad_u256(&U256::from(42)).len(), 78);
    }
}
