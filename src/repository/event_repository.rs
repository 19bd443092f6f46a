use super::models::{NftType, TransferEvent};
use super::{column_error, pad_u256, parse_address, parse_padded_u256, unpad_u256};
use alloy_primitives::B256;
use anyhow::Result;
use rusqlite::{Connection, Row, params};

pub struct EventRepository<'a> {
    conn: &'a Connection,
    nft_type: NftType,
}

impl<'a> EventRepository<'a> {
    const COLUMNS: &'static str = "tx_hash, block_number, contract_address, from_address, to_address, token_id, token_value, token_name, token_symbol, token_decimal";

    pub fn new(conn: &'a Connection, nft_type: NftType) -> Self {
        Self { conn, nft_type }
    }

    fn table(&self) -> &'static str {
        self.nft_type.events_table()
    }

    /// Inserts events, ignoring ones already stored under the same
    /// (tx_hash, contract_address, token_id) key. Returns the number of new rows.
    pub fn insert_batch(&self, events: &[TransferEvent]) -> Result<usize> {
        let query = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            self.table(),
            Self::COLUMNS
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(&query)?;

            for event in events {
                count += stmt.execute(params![
                    format!("{:?}", event.tx_hash),
                    event.block_number,
                    format!("{:?}", event.contract_address),
                    format!("{:?}", event.from),
                    format!("{:?}", event.to),
                    pad_u256(&event.token_id),
                    event.token_value.as_ref().map(pad_u256),
                    event.token_name,
                    event.token_symbol,
                    event.token_decimal,
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn get_last_block(&self) -> Result<Option<u64>> {
        let block: Option<u64> = self.conn.query_row(
            &format!("SELECT MAX(block_number) FROM {}", self.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(block)
    }

    pub fn query_events(&self, limit: usize, offset: usize) -> Result<Vec<TransferEvent>> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY block_number DESC, tx_hash LIMIT {limit} OFFSET {offset}",
            Self::COLUMNS,
            self.table()
        );

        let mut stmt = self.conn.prepare(&query)?;
        let events = stmt
            .query_map([], Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    pub fn get_statistics(&self) -> Result<EventStats> {
        let table = self.table();

        let total_events: usize =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;

        let unique_tokens: usize = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM (SELECT DISTINCT contract_address, token_id FROM {table})"
            ),
            [],
            |row| row.get(0),
        )?;

        let (earliest_block, latest_block): (Option<u64>, Option<u64>) = self.conn.query_row(
            &format!("SELECT MIN(block_number), MAX(block_number) FROM {table}"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(EventStats {
            nft_type: self.nft_type,
            total_events,
            unique_tokens,
            earliest_block,
            latest_block,
        })
    }

    pub fn delete_all(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute(&format!("DELETE FROM {}", self.table()), [])?)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<TransferEvent> {
        let tx_hash = row
            .get::<_, String>(0)?
            .parse::<B256>()
            .map_err(|e| column_error(0, Box::new(e)))?;

        let token_value = row
            .get::<_, Option<String>>(6)?
            .map(|v| unpad_u256(&v))
            .transpose()
            .map_err(|e| column_error(6, Box::new(e)))?;

        Ok(TransferEvent {
            tx_hash,
            block_number: row.get(1)?,
            contract_address: parse_address(row, 2)?,
            from: parse_address(row, 3)?,
            to: parse_address(row, 4)?,
            token_id: parse_padded_u256(row, 5)?,
            token_value,
            token_name: row.get(7)?,
            token_symbol: row.get(8)?,
            token_decimal: row.get(9)?,
        })
    }
}

#[derive(Debug)]
pub struct EventStats {
    pub nft_type: NftType,
    pub total_events: usize,
    pub unique_tokens: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
