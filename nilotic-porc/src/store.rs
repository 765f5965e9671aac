//! SQLite-backed persistence for PoRC state.
//!
//! Four tables mirror the engine's in-memory maps: wallet statuses,
//! contribution logs, pools and tasks. Writes are serialized by the
//! engine's store lock.

use crate::error::PorcError;
use nilotic_shared_types::porc::{PorcContribution, PorcPool, PorcTask, PorcWalletStatus};
use nilotic_shared_types::unix_now;
use rusqlite::Connection;

pub struct PorcStore {
    conn: Connection,
}

impl PorcStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: &str) -> Result<Self, PorcError> {
        let conn = Connection::open(path)?;
        let store = PorcStore { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Creates an in-memory store (for tests).
    pub fn in_memory() -> Result<Self, PorcError> {
        let conn = Connection::open_in_memory()?;
        let store = PorcStore { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), PorcError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallet_status (
                address TEXT PRIMARY KEY,
                is_enabled INTEGER,
                total_resource_points INTEGER,
                total_rewards INTEGER,
                last_contribution INTEGER,
                reputation_score INTEGER,
                bandwidth_limit INTEGER,
                is_early_adopter INTEGER,
                pool_index INTEGER,
                created_at INTEGER,
                updated_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS contributions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT,
                task_id TEXT,
                timestamp INTEGER,
                block_height INTEGER,
                bandwidth_used INTEGER,
                transactions_relayed INTEGER,
                uptime_seconds INTEGER,
                proof_hash TEXT,
                signature TEXT,
                resource_points INTEGER,
                created_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS pools (
                pool_index INTEGER PRIMARY KEY,
                wallet_addresses TEXT,
                total_resource_points INTEGER,
                block_start INTEGER,
                block_end INTEGER,
                is_active INTEGER,
                created_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                type INTEGER,
                assigned_wallet TEXT,
                timestamp INTEGER,
                block_height INTEGER,
                estimated_bandwidth INTEGER,
                estimated_transactions INTEGER,
                created_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_contributions_wallet ON contributions(wallet_address);
            CREATE INDEX IF NOT EXISTS idx_contributions_block ON contributions(block_height);
            CREATE INDEX IF NOT EXISTS idx_tasks_wallet ON tasks(assigned_wallet);",
        )?;
        Ok(())
    }

    /// Inserts or replaces a wallet status row.
    pub fn save_wallet_status(&self, status: &PorcWalletStatus) -> Result<(), PorcError> {
        let now = unix_now();
        self.conn.execute(
            "INSERT OR REPLACE INTO wallet_status
             (address, is_enabled, total_resource_points, total_rewards, last_contribution,
              reputation_score, bandwidth_limit, is_early_adopter, pool_index, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                status.address,
                status.is_enabled as i64,
                status.total_resource_points as i64,
                status.total_rewards as i64,
                status.last_contribution as i64,
                status.reputation_score as i64,
                status.bandwidth_limit as i64,
                status.is_early_adopter as i64,
                status.pool_index as i64,
                now as i64,
                now as i64,
            ],
        )?;
        Ok(())
    }

    pub fn load_wallet_status(&self, address: &str) -> Result<Option<PorcWalletStatus>, PorcError> {
        let result = self.conn.query_row(
            "SELECT address, is_enabled, total_resource_points, total_rewards,
                    last_contribution, reputation_score, bandwidth_limit,
                    is_early_adopter, pool_index
             FROM wallet_status WHERE address = ?1",
            rusqlite::params![address],
            Self::row_to_wallet,
        );
        match result {
            Ok(status) => Ok(Some(status)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn load_all_wallets(&self) -> Result<Vec<PorcWalletStatus>, PorcError> {
        let mut stmt = self.conn.prepare(
            "SELECT address, is_enabled, total_resource_points, total_rewards,
                    last_contribution, reputation_score, bandwidth_limit,
                    is_early_adopter, pool_index
             FROM wallet_status ORDER BY address",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_wallet)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn row_to_wallet(row: &rusqlite::Row<'_>) -> rusqlite::Result<PorcWalletStatus> {
        Ok(PorcWalletStatus {
            address: row.get(0)?,
            is_enabled: row.get::<_, i64>(1)? != 0,
            total_resource_points: row.get::<_, i64>(2)? as u64,
            total_rewards: row.get::<_, i64>(3)? as u64,
            last_contribution: row.get::<_, i64>(4)? as u64,
            reputation_score: row.get::<_, i64>(5)? as u64,
            bandwidth_limit: row.get::<_, i64>(6)? as u64,
            is_early_adopter: row.get::<_, i64>(7)? != 0,
            pool_index: row.get::<_, i64>(8)? as u64,
        })
    }

    pub fn save_contribution(&self, contribution: &PorcContribution) -> Result<(), PorcError> {
        self.conn.execute(
            "INSERT INTO contributions
             (wallet_address, task_id, timestamp, block_height, bandwidth_used,
              transactions_relayed, uptime_seconds, proof_hash, signature,
              resource_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                contribution.wallet_address,
                contribution.task_id,
                contribution.timestamp as i64,
                contribution.block_height as i64,
                contribution.bandwidth_used as i64,
                contribution.transactions_relayed as i64,
                contribution.uptime_seconds as i64,
                contribution.proof_hash,
                contribution.signature,
                contribution.resource_points() as i64,
                unix_now() as i64,
            ],
        )?;
        Ok(())
    }

    pub fn contribution_count(&self) -> Result<u64, PorcError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contributions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn save_pool(&self, pool: &PorcPool) -> Result<(), PorcError> {
        let addresses = serde_json::to_string(&pool.wallet_addresses)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO pools
             (pool_index, wallet_addresses, total_resource_points, block_start,
              block_end, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                pool.pool_index as i64,
                addresses,
                pool.total_resource_points as i64,
                pool.block_start as i64,
                pool.block_end as i64,
                pool.is_active as i64,
                unix_now() as i64,
            ],
        )?;
        Ok(())
    }

    pub fn load_pools(&self) -> Result<Vec<PorcPool>, PorcError> {
        let mut stmt = self.conn.prepare(
            "SELECT pool_index, wallet_addresses, total_resource_points,
                    block_start, block_end, is_active
             FROM pools ORDER BY pool_index",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
                row.get::<_, i64>(4)? as u64,
                row.get::<_, i64>(5)? != 0,
            ))
        })?;

        let mut pools = Vec::new();
        for row in rows {
            let (pool_index, addresses, points, start, end, active) = row?;
            pools.push(PorcPool {
                pool_index,
                wallet_addresses: serde_json::from_str(&addresses)?,
                total_resource_points: points,
                block_start: start,
                block_end: end,
                is_active: active,
            });
        }
        Ok(pools)
    }

    /// Pools are rebuilt wholesale on rotation; stale rows go first.
    pub fn clear_pools(&self) -> Result<(), PorcError> {
        self.conn.execute("DELETE FROM pools", [])?;
        Ok(())
    }

    pub fn save_task(&self, task: &PorcTask) -> Result<(), PorcError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tasks
             (task_id, type, assigned_wallet, timestamp, block_height,
              estimated_bandwidth, estimated_transactions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                task.task_id,
                task.task_type as i64,
                task.assigned_wallet,
                task.timestamp as i64,
                task.block_height as i64,
                task.estimated_bandwidth_mb as i64,
                task.estimated_transactions as i64,
                unix_now() as i64,
            ],
        )?;
        Ok(())
    }
}
