use super::models::NftType;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        Self::create_tables(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nft_balances (
                nft_type TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                token_id TEXT NOT NULL,
                token_name TEXT NOT NULL,
                balance INTEGER NOT NULL,
                synced INTEGER NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (nft_type, contract_address, token_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nft_balances_synced
             ON nft_balances(synced)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nft_balances_token
             ON nft_balances(contract_address, token_id)",
            [],
        )?;

        // Both standards share one event schema but keep separate tables,
        // so each gets its own checkpoint.
        for nft_type in NftType::ALL {
            let table = nft_type.events_table();

            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        tx_hash TEXT NOT NULL,
                        block_number INTEGER NOT NULL,
                        contract_address TEXT NOT NULL,
                        from_address TEXT NOT NULL,
                        to_address TEXT NOT NULL,
                        token_id TEXT NOT NULL,
                        token_value TEXT,
                        token_name TEXT NOT NULL,
                        token_symbol TEXT NOT NULL,
                        token_decimal INTEGER,
                        PRIMARY KEY (tx_hash, contract_address, token_id)
                    )"
                ),
                [],
            )?;

            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_block_number
                     ON {table}(block_number)"
                ),
                [],
            )?;
        }

        Ok(())
    }
}
