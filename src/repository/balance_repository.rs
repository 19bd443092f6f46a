use super::models::{Nft, NftBalance, NftType, SyncedBalance};
use super::{column_error, pad_u256, parse_address, parse_padded_u256};
use alloy_primitives::{Address, U256};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

pub struct BalanceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> BalanceRepository<'a> {
    const SELECT_BALANCE: &'static str = "SELECT nft_type, contract_address, token_id, token_name, balance, synced, revision FROM nft_balances";

    const ORDER_BY: &'static str = " ORDER BY nft_type, contract_address, token_id";

    // New tokens start at balance 0; a token already known keeps its balance
    // but is invalidated, since the event may have moved it.
    const UPSERT_DISCOVERED: &'static str = "INSERT INTO nft_balances (
            nft_type, contract_address, token_id, token_name, balance, synced, revision
        ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0)
        ON CONFLICT (nft_type, contract_address, token_id) DO UPDATE SET
            synced = 0,
            revision = revision + 1,
            token_name = CASE WHEN excluded.token_name = '' THEN token_name ELSE excluded.token_name END";

    const UPDATE_SYNCED: &'static str = "UPDATE nft_balances SET balance = ?1, synced = 1
        WHERE nft_type = ?2 AND contract_address = ?3 AND token_id = ?4 AND revision = ?5";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_all(&self) -> Result<Vec<NftBalance>> {
        let query = format!("{}{}", Self::SELECT_BALANCE, Self::ORDER_BY);
        let mut stmt = self.conn.prepare(&query)?;
        let balances = stmt
            .query_map([], Self::row_to_balance)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(balances)
    }

    pub fn get_not_synced(&self) -> Result<Vec<NftBalance>> {
        let query = format!("{} WHERE synced = 0{}", Self::SELECT_BALANCE, Self::ORDER_BY);
        let mut stmt = self.conn.prepare(&query)?;
        let balances = stmt
            .query_map([], Self::row_to_balance)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(balances)
    }

    /// Point lookup by contract and token id. The standard is not part of the
    /// key here; a contract implements one of them.
    pub fn get(&self, contract_address: &Address, token_id: &U256) -> Result<Option<NftBalance>> {
        let query = format!(
            "{} WHERE contract_address = ?1 AND token_id = ?2{} LIMIT 1",
            Self::SELECT_BALANCE,
            Self::ORDER_BY
        );
        let balance = self
            .conn
            .query_row(
                &query,
                params![format!("{contract_address:?}"), pad_u256(token_id)],
                Self::row_to_balance,
            )
            .optional()?;
        Ok(balance)
    }

    pub fn save_discovered(&self, nfts: &[Nft]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(Self::UPSERT_DISCOVERED)?;

            for nft in nfts {
                stmt.execute(params![
                    nft.nft_type.as_str(),
                    format!("{:?}", nft.contract_address),
                    pad_u256(&nft.token_id),
                    nft.token_name,
                ])?;
            }
        }

        tx.commit()?;
        Ok(nfts.len())
    }

    /// Writes probe results in one transaction. Rows invalidated since the
    /// pass read them are skipped and stay unsynced.
    pub fn set_synced(&self, balances: &[SyncedBalance]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(Self::UPDATE_SYNCED)?;

            for synced in balances {
                count += stmt.execute(params![
                    synced.balance,
                    synced.nft.nft_type.as_str(),
                    format!("{:?}", synced.nft.contract_address),
                    pad_u256(&synced.nft.token_id),
                    synced.revision,
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn delete_all(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM nft_balances", [])?)
    }

    fn row_to_balance(row: &Row) -> rusqlite::Result<NftBalance> {
        let nft_type = row
            .get::<_, String>(0)?
            .parse::<NftType>()
            .map_err(|e| column_error(0, e.into()))?;
        let contract_address = parse_address(row, 1)?;
        let token_id = parse_padded_u256(row, 2)?;

        Ok(NftBalance {
            nft: Nft {
                nft_type,
                contract_address,
                token_id,
                token_name: row.get(3)?,
            },
            balance: row.get(4)?,
            synced: row.get(5)?,
            revision: row.get(6)?,
        })
    }
}
